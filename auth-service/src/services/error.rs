use service_core::error::AppError;
use thiserror::Error;

/// Service-layer error taxonomy.
///
/// Persistence errors are translated into this taxonomy at the store
/// boundary; raw sqlx errors never cross it. Credential failures are
/// deliberately coarse: a missing user and a wrong password both surface as
/// `InvalidCredentials`, and RBAC denials never name the missing capability.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Forbidden: {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflict: {0}")]
    Conflict(&'static str),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store unavailable")]
    StoreUnavailable,

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::Unauthorized(msg) => AppError::Unauthorized(anyhow::anyhow!(msg)),
            ServiceError::Forbidden(msg) => AppError::Forbidden(anyhow::anyhow!(msg)),
            ServiceError::NotFound(what) => AppError::NotFound(anyhow::anyhow!("{} not found", what)),
            ServiceError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            ServiceError::Configuration(msg) => AppError::ConfigError(anyhow::anyhow!(msg)),
            ServiceError::StoreUnavailable => AppError::ServiceUnavailable(Some(1)),
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
