//! PostgreSQL implementations of the token store and registry store.
//!
//! All sqlx errors are translated into the service taxonomy here; raw
//! storage errors never cross the service boundary. Pool acquisition carries
//! a bounded timeout, surfaced as the retryable `StoreUnavailable`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Permission, Principal, Role, TokenRecord};
use crate::services::jwt::IssuedPair;
use crate::services::registry::RegistryStore;
use crate::services::token_store::{RefreshConsumption, TokenStore};
use crate::services::ServiceError;

/// Translate a sqlx error at the store boundary.
fn map_sqlx(e: sqlx::Error) -> ServiceError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            ServiceError::StoreUnavailable
        }
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            ServiceError::Conflict("Duplicate value")
        }
        other => ServiceError::Database(anyhow::Error::new(other)),
    }
}

/// Connection pool wrapper shared by the Postgres stores.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ServiceError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(map_sqlx)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), ServiceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ServiceError::Database(anyhow::Error::new(e)))
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}

// ==================== Token store ====================

pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn record_pair(
        &self,
        principal_id: i64,
        pair: &IssuedPair,
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO tokens (principal_id, kind, token, pair_id, revoked, expires_at)
            VALUES ($1, 'access', $2, $3, FALSE, $4)
            "#,
        )
        .bind(principal_id)
        .bind(&pair.access.token)
        .bind(pair.pair_id)
        .bind(pair.access.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        sqlx::query(
            r#"
            INSERT INTO tokens (principal_id, kind, token, pair_id, revoked, expires_at)
            VALUES ($1, 'refresh', $2, $3, FALSE, $4)
            "#,
        )
        .bind(principal_id)
        .bind(&pair.refresh.token)
        .bind(pair.pair_id)
        .bind(pair.refresh.expires_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)
    }

    async fn find_live(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<Option<TokenRecord>, ServiceError> {
        sqlx::query_as::<_, TokenRecord>(
            r#"
            SELECT * FROM tokens
            WHERE principal_id = $1 AND token = $2
              AND revoked = FALSE AND expires_at > NOW()
            "#,
        )
        .bind(principal_id)
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn revoke(&self, principal_id: i64, token: &str) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE tokens SET revoked = TRUE WHERE principal_id = $1 AND token = $2",
        )
        .bind(principal_id)
        .bind(token)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Token"));
        }
        Ok(())
    }

    async fn revoke_all(&self, principal_id: i64) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE tokens SET revoked = TRUE WHERE principal_id = $1 AND revoked = FALSE",
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }

    async fn consume_refresh(
        &self,
        principal_id: i64,
        token: &str,
    ) -> Result<RefreshConsumption, ServiceError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        // The conditional UPDATE is the compare-and-swap: of two racing
        // refreshers, only one sees a row flip from live to revoked.
        let pair_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE tokens SET revoked = TRUE
            WHERE principal_id = $1 AND token = $2 AND kind = 'refresh'
              AND revoked = FALSE AND expires_at > NOW()
            RETURNING pair_id
            "#,
        )
        .bind(principal_id)
        .bind(token)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let Some(pair_id) = pair_id else {
            tx.rollback().await.map_err(map_sqlx)?;

            let exists: Option<i64> = sqlx::query_scalar(
                "SELECT id FROM tokens WHERE principal_id = $1 AND token = $2 AND kind = 'refresh'",
            )
            .bind(principal_id)
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

            return Ok(if exists.is_some() {
                RefreshConsumption::AlreadyRevoked
            } else {
                RefreshConsumption::Unknown
            });
        };

        sqlx::query("UPDATE tokens SET revoked = TRUE WHERE pair_id = $1")
            .bind(pair_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(RefreshConsumption::Rotated)
    }

    async fn purge_expired(&self) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        Ok(result.rows_affected())
    }
}

// ==================== Registry store ====================

pub struct PgRegistryStore {
    pool: PgPool,
}

impl PgRegistryStore {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn insert_principal(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Principal, ServiceError> {
        sqlx::query_as::<_, Principal>(
            r#"
            INSERT INTO principals (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx(e) {
            ServiceError::Conflict(_) => ServiceError::Conflict("Duplicate username"),
            other => other,
        })
    }

    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, ServiceError> {
        sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_principal_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        // Case-sensitive exact match by contract.
        sqlx::query_as::<_, Principal>("SELECT * FROM principals WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, ServiceError> {
        sqlx::query_as::<_, Principal>("SELECT * FROM principals ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn update_principal(
        &self,
        id: i64,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Principal, ServiceError> {
        sqlx::query_as::<_, Principal>(
            r#"
            UPDATE principals
            SET email = COALESCE($2, email),
                password_hash = COALESCE($3, password_hash)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(ServiceError::NotFound("User"))
    }

    async fn delete_principal(&self, id: i64) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM principals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("User"));
        }
        Ok(())
    }

    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_super_admin: bool,
    ) -> Result<Role, ServiceError> {
        sqlx::query_as::<_, Role>(
            r#"
            INSERT INTO roles (name, description, is_super_admin)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(name)
        .bind(description)
        .bind(is_super_admin)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx(e) {
            ServiceError::Conflict(_) => ServiceError::Conflict("Duplicate role name"),
            other => other,
        })
    }

    async fn find_role(&self, id: i64) -> Result<Option<Role>, ServiceError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        sqlx::query_as::<_, Role>("SELECT * FROM roles ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn update_role(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role, ServiceError> {
        sqlx::query_as::<_, Role>(
            "UPDATE roles SET name = $2, description = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(ServiceError::NotFound("Role"))
    }

    async fn delete_role(&self, id: i64) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Role"));
        }
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), ServiceError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        for &permission_id in permission_ids {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)",
            )
            .bind(role_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        }

        tx.commit().await.map_err(map_sqlx)
    }

    async fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn insert_permission(
        &self,
        key: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        sqlx::query_as::<_, Permission>(
            "INSERT INTO permissions (key, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(key)
        .bind(description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match map_sqlx(e) {
            ServiceError::Conflict(_) => ServiceError::Conflict("Duplicate permission key"),
            other => other,
        })
    }

    async fn find_permission(&self, id: i64) -> Result<Option<Permission>, ServiceError> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn find_permission_by_key(
        &self,
        key: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        sqlx::query_as::<_, Permission>("SELECT * FROM permissions ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
    }

    async fn update_permission(
        &self,
        id: i64,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        sqlx::query_as::<_, Permission>(
            "UPDATE permissions SET description = $2 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(description)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?
        .ok_or(ServiceError::NotFound("Permission"))
    }

    async fn delete_permission(&self, id: i64) -> Result<(), ServiceError> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ServiceError::NotFound("Permission"));
        }
        Ok(())
    }

    async fn roles_holding_permission(
        &self,
        permission_id: i64,
    ) -> Result<Vec<Role>, ServiceError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN role_permissions rp ON rp.role_id = r.id
            WHERE rp.permission_id = $1
            "#,
        )
        .bind(permission_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn unassign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn super_admin_holders(&self) -> Result<Vec<i64>, ServiceError> {
        sqlx::query_scalar(
            r#"
            SELECT ur.user_id FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            WHERE r.is_super_admin = TRUE
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn permission_keys_for(&self, user_id: i64) -> Result<HashSet<String>, ServiceError> {
        let keys: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT p.key FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(keys.into_iter().collect())
    }
}
