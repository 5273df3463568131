//! User management handlers.
//!
//! Guard pipeline per route: `auth_middleware` authenticates and resolves
//! the principal; the `authorize` call here is the capability stage and
//! short-circuits before any registry work.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::rbac::{AssignRoleRequest, CreateUserRequest, UpdateUserRequest};
use crate::middleware::AuthUser;
use crate::models::{keys, PrincipalWithRoles, SanitizedPrincipal};
use crate::services::ServiceError;
use crate::utils::{hash_password, Password};
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<SanitizedPrincipal>>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_USER_LIST])
        .await?;

    let users = state.registry.list_users().await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PrincipalWithRoles>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_USER_LIST])
        .await?;

    let (principal, roles) = state.registry.get_user(id).await?;
    Ok(Json(PrincipalWithRoles {
        principal: principal.into(),
        roles,
    }))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<SanitizedPrincipal>), AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::CREATE_USER])
        .await?;

    req.validate()?;
    let hash = hash_password(&Password::new(req.password)).map_err(ServiceError::Internal)?;
    let user = state
        .registry
        .create_user(&req.username, &req.email, hash.as_str())
        .await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<SanitizedPrincipal>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_USER])
        .await?;

    req.validate()?;
    let hash = match &req.password {
        Some(password) => Some(
            hash_password(&Password::new(password.clone())).map_err(ServiceError::Internal)?,
        ),
        None => None,
    };
    let user = state
        .registry
        .update_user(id, req.email.as_deref(), hash.as_ref().map(|h| h.as_str()))
        .await?;
    Ok(Json(user.into()))
}

/// Refused while the target is the last Super-Admin holder.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::DELETE_USER])
        .await?;

    state.registry.delete_user(id).await?;
    Ok(Json(json!({ "message": "User deleted" })))
}

pub async fn assign_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<AssignRoleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_USER])
        .await?;

    state.registry.assign_role(id, req.role_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Role assigned" })),
    ))
}

/// The Super-Admin assignment is never removable.
pub async fn remove_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((id, role_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_USER])
        .await?;

    state.registry.remove_role(id, role_id).await?;
    Ok(Json(json!({ "message": "Role removed" })))
}
