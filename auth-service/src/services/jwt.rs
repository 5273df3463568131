use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::ServiceError;

/// Token issuer and structural validator.
///
/// Access and refresh credentials are signed with distinct secrets and carry
/// distinct lifetimes (minutes vs days). Decoding is a local operation; the
/// store-backed liveness check is a separate step owned by the caller.
#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_minutes: i64,
    refresh_ttl_days: i64,
}

/// Claims carried by both credential kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal id)
    pub sub: i64,
    /// Username at issuance
    pub username: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

/// A signed credential together with its expiry, ready to persist.
#[derive(Debug, Clone)]
pub struct SignedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Co-issued access/refresh pair. `pair_id` links the stored rows so that
/// rotation can revoke both halves together.
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub pair_id: Uuid,
    pub access: SignedCredential,
    pub refresh: SignedCredential,
}

/// Token response returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl JwtService {
    /// Create a new JWT service from configured secrets.
    ///
    /// Missing or empty secrets are a fatal configuration error, never a
    /// silent downgrade.
    pub fn new(config: &JwtConfig) -> Result<Self, ServiceError> {
        if config.access_secret.is_empty() || config.refresh_secret.is_empty() {
            return Err(ServiceError::Configuration(
                "JWT signing secrets must be configured".to_string(),
            ));
        }

        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_minutes: config.access_ttl_minutes,
            refresh_ttl_days: config.refresh_ttl_days,
        })
    }

    /// Sign an access credential for a principal.
    pub fn sign_access(
        &self,
        principal_id: i64,
        username: &str,
    ) -> Result<SignedCredential, ServiceError> {
        self.sign(
            principal_id,
            username,
            Duration::minutes(self.access_ttl_minutes),
            &self.access_encoding,
        )
    }

    /// Sign a refresh credential for a principal.
    pub fn sign_refresh(
        &self,
        principal_id: i64,
        username: &str,
    ) -> Result<SignedCredential, ServiceError> {
        self.sign(
            principal_id,
            username,
            Duration::days(self.refresh_ttl_days),
            &self.refresh_encoding,
        )
    }

    fn sign(
        &self,
        principal_id: i64,
        username: &str,
        ttl: Duration,
        key: &EncodingKey,
    ) -> Result<SignedCredential, ServiceError> {
        let now = Utc::now();
        let expires_at = now + ttl;

        let claims = Claims {
            sub: principal_id,
            username: username.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| ServiceError::Configuration(format!("Failed to sign credential: {}", e)))?;

        Ok(SignedCredential { token, expires_at })
    }

    /// Issue a linked access/refresh pair.
    pub fn issue_pair(
        &self,
        principal_id: i64,
        username: &str,
    ) -> Result<IssuedPair, ServiceError> {
        let access = self.sign_access(principal_id, username)?;
        let refresh = self.sign_refresh(principal_id, username)?;

        Ok(IssuedPair {
            pair_id: Uuid::new_v4(),
            access,
            refresh,
        })
    }

    /// Structurally validate and decode an access credential.
    pub fn decode_access(&self, token: &str) -> Result<Claims, ServiceError> {
        Self::decode_with(token, &self.access_decoding)
    }

    /// Structurally validate and decode a refresh credential.
    pub fn decode_refresh(&self, token: &str) -> Result<Claims, ServiceError> {
        Self::decode_with(token, &self.refresh_decoding)
    }

    fn decode_with(token: &str, key: &DecodingKey) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        match decode::<Claims>(token, key, &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) => match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(ServiceError::Unauthorized("expired"))
                }
                _ => Err(ServiceError::Unauthorized("invalid token")),
            },
        }
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_expiry_seconds(&self) -> i64 {
        self.access_ttl_minutes * 60
    }
}
