use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::auth::{RefreshRequest, SigninRequest, SignupRequest};
use crate::middleware::{AuthUser, BearerToken};
use crate::services::TokenResponse;
use crate::AppState;

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    req.validate()?;
    let tokens = state.auth.signup(req).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()?;
    let tokens = state.auth.signin(req).await?;
    Ok(Json(tokens))
}

/// Full session termination: the presented access credential must still be
/// live, then every credential for the principal is revoked.
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(context): AuthUser,
    BearerToken(token): BearerToken,
) -> Result<Json<Value>, AppError> {
    state.auth.logout(context.principal_id, &token).await?;
    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// Rotate a refresh credential for a fresh pair. Replaying an already
/// rotated credential fails with 401.
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    req.validate()?;
    let tokens = state.auth.refresh_presented(&req.refresh_token).await?;
    Ok(Json(tokens))
}
