use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Permission;

/// Role entity.
///
/// Exactly one role in the system carries `is_super_admin`; it is seeded at
/// startup and the mutation API refuses to delete, rename, or strip it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_super_admin: bool,
    pub created_at: DateTime<Utc>,
}

/// Role-to-permission grant (many-to-many).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RolePermission {
    pub role_id: i64,
    pub permission_id: i64,
}

/// Role with its resolved permission grants, for detail responses.
#[derive(Debug, Clone, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}
