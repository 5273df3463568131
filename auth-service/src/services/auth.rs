use std::sync::Arc;

use crate::dtos::auth::{SigninRequest, SignupRequest};
use crate::models::Principal;
use crate::services::jwt::{JwtService, TokenResponse};
use crate::services::notifier::CredentialNotifier;
use crate::services::registry::RegistryStore;
use crate::services::token_store::{RefreshConsumption, TokenStore};
use crate::services::ServiceError;
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

/// Principal identity attached to a request after the guard accepts its
/// bearer credential.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal_id: i64,
    pub username: String,
}

/// Token lifecycle engine: credential verification, issuance, validation,
/// rotation, and session termination.
#[derive(Clone)]
pub struct AuthService {
    registry: Arc<dyn RegistryStore>,
    tokens: Arc<dyn TokenStore>,
    jwt: JwtService,
    notifier: Arc<dyn CredentialNotifier>,
}

impl AuthService {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        tokens: Arc<dyn TokenStore>,
        jwt: JwtService,
        notifier: Arc<dyn CredentialNotifier>,
    ) -> Self {
        Self {
            registry,
            tokens,
            jwt,
            notifier,
        }
    }

    /// Register a new principal and hand it a credential pair.
    pub async fn signup(&self, req: SignupRequest) -> Result<TokenResponse, ServiceError> {
        let password_hash = hash_password(&Password::new(req.password))
            .map_err(ServiceError::Internal)?;

        let principal = self
            .registry
            .insert_principal(&req.username, &req.email, password_hash.as_str())
            .await?;

        tracing::info!(user_id = %principal.id, "User registered");

        let tokens = self.issue_and_record(&principal).await?;
        self.notify_issued(&principal, &tokens);
        Ok(tokens)
    }

    /// Verify username/password and issue a credential pair.
    ///
    /// Unknown username and wrong password are indistinguishable to the
    /// caller.
    pub async fn signin(&self, req: SigninRequest) -> Result<TokenResponse, ServiceError> {
        let principal = self
            .registry
            .find_principal_by_username(&req.username)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(principal.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        tracing::info!(user_id = %principal.id, "User signed in");

        let tokens = self.issue_and_record(&principal).await?;
        self.notify_issued(&principal, &tokens);
        Ok(tokens)
    }

    /// Validate a bearer access credential: structural decode + expiry, then
    /// the mandatory store-backed liveness check. Signature validity alone
    /// cannot express revocation.
    pub async fn validate_access(&self, token: &str) -> Result<AuthContext, ServiceError> {
        let claims = self.jwt.decode_access(token)?;

        self.tokens
            .find_live(claims.sub, token)
            .await?
            .ok_or(ServiceError::Unauthorized("revoked or unknown"))?;

        Ok(AuthContext {
            principal_id: claims.sub,
            username: claims.username,
        })
    }

    /// Rotate a refresh credential: revoke the presented credential and its
    /// co-issued access credential, then issue a fresh pair. At most one of
    /// two concurrent calls on the same credential succeeds; the loser sees
    /// `Unauthorized("already rotated")`.
    pub async fn refresh(
        &self,
        principal_id: i64,
        refresh_token: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let claims = self.jwt.decode_refresh(refresh_token)?;
        if claims.sub != principal_id {
            return Err(ServiceError::Unauthorized("invalid token"));
        }

        match self.tokens.consume_refresh(principal_id, refresh_token).await? {
            RefreshConsumption::Rotated => {}
            RefreshConsumption::AlreadyRevoked => {
                tracing::warn!(user_id = %principal_id, "Replayed refresh credential");
                return Err(ServiceError::Unauthorized("already rotated"));
            }
            RefreshConsumption::Unknown => {
                return Err(ServiceError::Unauthorized("revoked or unknown"));
            }
        }

        let principal = self
            .registry
            .find_principal(principal_id)
            .await?
            .ok_or(ServiceError::Unauthorized("invalid token"))?;

        tracing::info!(user_id = %principal.id, "Tokens rotated");

        self.issue_and_record(&principal).await
    }

    /// Refresh using only the presented credential; the subject claim names
    /// the principal.
    pub async fn refresh_presented(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ServiceError> {
        let claims = self.jwt.decode_refresh(refresh_token)?;
        self.refresh(claims.sub, refresh_token).await
    }

    /// Terminate the whole session. Requires a live row matching
    /// principal + token, which is how "already logged out" is detected;
    /// then every live credential for the principal is revoked.
    pub async fn logout(&self, principal_id: i64, token: &str) -> Result<(), ServiceError> {
        self.tokens
            .find_live(principal_id, token)
            .await?
            .ok_or(ServiceError::Forbidden("Invalid or expired credential"))?;

        self.tokens.revoke_all(principal_id).await?;

        tracing::info!(user_id = %principal_id, "User logged out");
        Ok(())
    }

    /// Sign a pair and persist both rows before anything is returned. A
    /// credential without a durable record must never reach a client.
    async fn issue_and_record(&self, principal: &Principal) -> Result<TokenResponse, ServiceError> {
        let pair = self.jwt.issue_pair(principal.id, &principal.username)?;

        self.tokens.record_pair(principal.id, &pair).await?;

        Ok(TokenResponse {
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt.access_expiry_seconds(),
        })
    }

    /// Fire-and-forget the issued-credentials event.
    fn notify_issued(&self, principal: &Principal, tokens: &TokenResponse) {
        let notifier = Arc::clone(&self.notifier);
        let principal_id = principal.id;
        let email = principal.email.clone();
        let tokens = tokens.clone();

        tokio::spawn(async move {
            if let Err(e) = notifier
                .credentials_issued(principal_id, &email, &tokens)
                .await
            {
                tracing::warn!(user_id = %principal_id, error = %e, "Credential notification failed");
            }
        });
    }
}
