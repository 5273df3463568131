use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::{AuthContext, ServiceError};
use crate::AppState;

/// Raw bearer credential, kept alongside the decoded context so handlers
/// like logout can act on the exact presented token.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Guard run once per protected request, before any business logic.
///
/// Ordered pipeline: extract bearer, structural decode + expiry, then the
/// store-backed liveness check; each failure short-circuits with 401. On
/// success the principal identity is attached to the request for the RBAC
/// evaluator and handlers.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let token = match token {
        Some(token) => token.to_string(),
        None => return Err(ServiceError::Unauthorized("missing token").into()),
    };

    let context = state.auth.validate_access(&token).await?;

    req.extensions_mut().insert(context);
    req.extensions_mut().insert(BearerToken(token));

    Ok(next.run(req).await)
}

/// Extractor for the authenticated principal in handlers.
pub struct AuthUser(pub AuthContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(context.clone()))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerToken>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Bearer token missing from request extensions"
                ))
            })
    }
}
