//! Permission management handlers. Deletion policy (strict refusal while
//! granted anywhere) lives in the registry service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::rbac::{CreatePermissionRequest, UpdatePermissionRequest};
use crate::middleware::AuthUser;
use crate::models::{keys, Permission};
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Permission>>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_PERMISSION_LIST])
        .await?;

    Ok(Json(state.registry.list_permissions().await?))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Permission>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_PERMISSION_LIST])
        .await?;

    Ok(Json(state.registry.get_permission(id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<Permission>), AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::CREATE_PERMISSION])
        .await?;

    req.validate()?;
    let permission = state
        .registry
        .create_permission(&req.key, req.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// The key is immutable identity; only the description changes.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePermissionRequest>,
) -> Result<Json<Permission>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_PERMISSION])
        .await?;

    let permission = state
        .registry
        .update_permission(id, req.description.as_deref())
        .await?;
    Ok(Json(permission))
}

/// Strict policy: refused while any role still holds the grant.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::DELETE_PERMISSION])
        .await?;

    state.registry.delete_permission(id).await?;
    Ok(Json(json!({ "message": "Permission deleted" })))
}
