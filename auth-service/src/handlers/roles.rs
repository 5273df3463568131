//! Role management handlers. Super-Admin protection lives in the registry
//! service; these stay thin.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use service_core::error::AppError;
use validator::Validate;

use crate::dtos::rbac::{CreateRoleRequest, SetPermissionsRequest, UpdateRoleRequest};
use crate::middleware::AuthUser;
use crate::models::{keys, Role, RoleWithPermissions};
use crate::AppState;

pub async fn list(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> Result<Json<Vec<Role>>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_ROLE_LIST])
        .await?;

    Ok(Json(state.registry.list_roles().await?))
}

pub async fn get(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RoleWithPermissions>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::VIEW_ROLE_LIST])
        .await?;

    let (role, permissions) = state.registry.get_role(id).await?;
    Ok(Json(RoleWithPermissions { role, permissions }))
}

pub async fn create(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::CREATE_ROLE])
        .await?;

    req.validate()?;
    let role = state
        .registry
        .create_role(&req.name, req.description.as_deref(), &req.permission_ids)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// The Super-Admin role refuses edits.
pub async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<Role>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_ROLE])
        .await?;

    req.validate()?;
    let role = state
        .registry
        .update_role(id, &req.name, req.description.as_deref())
        .await?;
    Ok(Json(role))
}

/// The Super-Admin role refuses deletion.
pub async fn delete(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::DELETE_ROLE])
        .await?;

    state.registry.delete_role(id).await?;
    Ok(Json(json!({ "message": "Role deleted" })))
}

/// Replace the role's permission grants wholesale.
pub async fn set_permissions(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SetPermissionsRequest>,
) -> Result<Json<Value>, AppError> {
    state
        .rbac
        .authorize(actor.principal_id, &[keys::UPDATE_ROLE])
        .await?;

    state
        .registry
        .replace_role_permissions(id, &req.permission_ids)
        .await?;
    Ok(Json(json!({ "message": "Permissions updated" })))
}
