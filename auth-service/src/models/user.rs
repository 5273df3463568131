use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::Role;

/// Principal (user) entity.
///
/// The password hash never leaves the service boundary; responses use
/// [`SanitizedPrincipal`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Principal representation safe for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedPrincipal {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<Principal> for SanitizedPrincipal {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            username: p.username,
            email: p.email,
            created_at: p.created_at,
        }
    }
}

/// Principal with resolved role assignments, for detail responses.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalWithRoles {
    #[serde(flatten)]
    pub principal: SanitizedPrincipal,
    pub roles: Vec<Role>,
}

/// Principal-to-role assignment (many-to-many).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub user_id: i64,
    pub role_id: i64,
}
