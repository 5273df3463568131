use async_trait::async_trait;
use serde::Serialize;

use crate::services::jwt::TokenResponse;

/// Outbound "credentials issued" side channel.
///
/// Strictly best effort: the auth flows spawn the call and never let a
/// delivery failure fail a signup or signin.
#[async_trait]
pub trait CredentialNotifier: Send + Sync {
    async fn credentials_issued(
        &self,
        principal_id: i64,
        email: &str,
        tokens: &TokenResponse,
    ) -> Result<(), anyhow::Error>;
}

#[derive(Debug, Serialize)]
struct CredentialsIssuedEvent<'a> {
    principal_id: i64,
    email: &'a str,
    access_token: &'a str,
    refresh_token: &'a str,
}

/// HTTP notifier posting the event to the notification service.
#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    pub fn new(endpoint: &str) -> Self {
        tracing::info!(endpoint = %endpoint, "Credential notifier configured");
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl CredentialNotifier for HttpNotifier {
    async fn credentials_issued(
        &self,
        principal_id: i64,
        email: &str,
        tokens: &TokenResponse,
    ) -> Result<(), anyhow::Error> {
        let event = CredentialsIssuedEvent {
            principal_id,
            email,
            access_token: &tokens.access_token,
            refresh_token: &tokens.refresh_token,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&event)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Notification service returned {}",
                response.status()
            );
        }

        Ok(())
    }
}

/// No-op notifier for tests and deployments without a notification service.
#[derive(Debug, Default, Clone)]
pub struct NoopNotifier;

#[async_trait]
impl CredentialNotifier for NoopNotifier {
    async fn credentials_issued(
        &self,
        _principal_id: i64,
        _email: &str,
        _tokens: &TokenResponse,
    ) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
