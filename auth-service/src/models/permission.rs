use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Permission entity. The `key` is the stable capability identifier and is
/// immutable once created; only the description may change.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub key: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Capability keys guarding the management API.
pub mod keys {
    pub const VIEW_USER_LIST: &str = "VIEW_USER_LIST";
    pub const CREATE_USER: &str = "CREATE_USER";
    pub const UPDATE_USER: &str = "UPDATE_USER";
    pub const DELETE_USER: &str = "DELETE_USER";

    pub const VIEW_ROLE_LIST: &str = "VIEW_ROLE_LIST";
    pub const CREATE_ROLE: &str = "CREATE_ROLE";
    pub const UPDATE_ROLE: &str = "UPDATE_ROLE";
    pub const DELETE_ROLE: &str = "DELETE_ROLE";

    pub const VIEW_PERMISSION_LIST: &str = "VIEW_PERMISSION_LIST";
    pub const CREATE_PERMISSION: &str = "CREATE_PERMISSION";
    pub const UPDATE_PERMISSION: &str = "UPDATE_PERMISSION";
    pub const DELETE_PERMISSION: &str = "DELETE_PERMISSION";

    /// The baseline catalogue, seeded at startup.
    pub const ALL: &[&str] = &[
        VIEW_USER_LIST,
        CREATE_USER,
        UPDATE_USER,
        DELETE_USER,
        VIEW_ROLE_LIST,
        CREATE_ROLE,
        UPDATE_ROLE,
        DELETE_ROLE,
        VIEW_PERMISSION_LIST,
        CREATE_PERMISSION,
        UPDATE_PERMISSION,
        DELETE_PERMISSION,
    ];
}
