use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{keys, Permission, Principal, Role, RolePermission, UserRole};
use crate::services::ServiceError;

/// Storage primitives for principals, roles, permissions, and their joins.
///
/// Uniqueness of username and permission key is enforced here (`Conflict`).
/// Invariant checks (Super-Admin protection) live in [`RegistryService`]; no
/// mutation path reaches the store without passing through it.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // Principals
    async fn insert_principal(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Principal, ServiceError>;
    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, ServiceError>;
    async fn find_principal_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Principal>, ServiceError>;
    async fn list_principals(&self) -> Result<Vec<Principal>, ServiceError>;
    async fn update_principal(
        &self,
        id: i64,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Principal, ServiceError>;
    async fn delete_principal(&self, id: i64) -> Result<(), ServiceError>;

    // Roles
    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_super_admin: bool,
    ) -> Result<Role, ServiceError>;
    async fn find_role(&self, id: i64) -> Result<Option<Role>, ServiceError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError>;
    async fn list_roles(&self) -> Result<Vec<Role>, ServiceError>;
    async fn update_role(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role, ServiceError>;
    async fn delete_role(&self, id: i64) -> Result<(), ServiceError>;
    async fn set_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), ServiceError>;
    async fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError>;

    // Permissions
    async fn insert_permission(
        &self,
        key: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError>;
    async fn find_permission(&self, id: i64) -> Result<Option<Permission>, ServiceError>;
    async fn find_permission_by_key(&self, key: &str)
        -> Result<Option<Permission>, ServiceError>;
    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError>;
    async fn update_permission(
        &self,
        id: i64,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError>;
    async fn delete_permission(&self, id: i64) -> Result<(), ServiceError>;
    async fn roles_holding_permission(
        &self,
        permission_id: i64,
    ) -> Result<Vec<Role>, ServiceError>;

    // Assignments
    async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError>;
    async fn unassign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError>;
    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, ServiceError>;
    /// Ids of every principal holding a Super-Admin role assignment.
    async fn super_admin_holders(&self) -> Result<Vec<i64>, ServiceError>;
    /// Fresh union of permission keys reachable through the principal's role
    /// assignments. Never cached across requests.
    async fn permission_keys_for(&self, user_id: i64) -> Result<HashSet<String>, ServiceError>;
}

/// In-memory registry store, used by the test suite.
#[derive(Default)]
pub struct MemoryRegistryStore {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: i64,
    principals: Vec<Principal>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    user_roles: Vec<UserRole>,
    role_permissions: Vec<RolePermission>,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryInner {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn insert_principal(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Principal, ServiceError> {
        let mut inner = self.inner.lock().await;
        if inner.principals.iter().any(|p| p.username == username) {
            return Err(ServiceError::Conflict("Duplicate username"));
        }
        let principal = Principal {
            id: inner.next(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        inner.principals.push(principal.clone());
        Ok(principal)
    }

    async fn find_principal(&self, id: i64) -> Result<Option<Principal>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.principals.iter().find(|p| p.id == id).cloned())
    }

    async fn find_principal_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Principal>, ServiceError> {
        let inner = self.inner.lock().await;
        // Case-sensitive exact match by contract.
        Ok(inner
            .principals
            .iter()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.principals.clone())
    }

    async fn update_principal(
        &self,
        id: i64,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Principal, ServiceError> {
        let mut inner = self.inner.lock().await;
        let principal = inner
            .principals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ServiceError::NotFound("User"))?;
        if let Some(email) = email {
            principal.email = email.to_string();
        }
        if let Some(hash) = password_hash {
            principal.password_hash = hash.to_string();
        }
        Ok(principal.clone())
    }

    async fn delete_principal(&self, id: i64) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        if !inner.principals.iter().any(|p| p.id == id) {
            return Err(ServiceError::NotFound("User"));
        }
        inner.principals.retain(|p| p.id != id);
        inner.user_roles.retain(|ur| ur.user_id != id);
        Ok(())
    }

    async fn insert_role(
        &self,
        name: &str,
        description: Option<&str>,
        is_super_admin: bool,
    ) -> Result<Role, ServiceError> {
        let mut inner = self.inner.lock().await;
        if inner.roles.iter().any(|r| r.name == name) {
            return Err(ServiceError::Conflict("Duplicate role name"));
        }
        let role = Role {
            id: inner.next(),
            name: name.to_string(),
            description: description.map(str::to_string),
            is_super_admin,
            created_at: Utc::now(),
        };
        inner.roles.push(role.clone());
        Ok(role)
    }

    async fn find_role(&self, id: i64) -> Result<Option<Role>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.roles.clone())
    }

    async fn update_role(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role, ServiceError> {
        let mut inner = self.inner.lock().await;
        let role = inner
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ServiceError::NotFound("Role"))?;
        role.name = name.to_string();
        role.description = description.map(str::to_string);
        Ok(role.clone())
    }

    async fn delete_role(&self, id: i64) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        if !inner.roles.iter().any(|r| r.id == id) {
            return Err(ServiceError::NotFound("Role"));
        }
        inner.roles.retain(|r| r.id != id);
        inner.user_roles.retain(|ur| ur.role_id != id);
        inner.role_permissions.retain(|rp| rp.role_id != id);
        Ok(())
    }

    async fn set_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        if !inner.roles.iter().any(|r| r.id == role_id) {
            return Err(ServiceError::NotFound("Role"));
        }
        inner.role_permissions.retain(|rp| rp.role_id != role_id);
        for &permission_id in permission_ids {
            inner.role_permissions.push(RolePermission {
                role_id,
                permission_id,
            });
        }
        Ok(())
    }

    async fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .role_permissions
            .iter()
            .filter(|rp| rp.role_id == role_id)
            .filter_map(|rp| {
                inner
                    .permissions
                    .iter()
                    .find(|p| p.id == rp.permission_id)
                    .cloned()
            })
            .collect())
    }

    async fn insert_permission(
        &self,
        key: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        let mut inner = self.inner.lock().await;
        if inner.permissions.iter().any(|p| p.key == key) {
            return Err(ServiceError::Conflict("Duplicate permission key"));
        }
        let permission = Permission {
            id: inner.next(),
            key: key.to_string(),
            description: description.map(str::to_string),
            created_at: Utc::now(),
        };
        inner.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn find_permission(&self, id: i64) -> Result<Option<Permission>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.permissions.iter().find(|p| p.id == id).cloned())
    }

    async fn find_permission_by_key(
        &self,
        key: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.permissions.iter().find(|p| p.key == key).cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner.permissions.clone())
    }

    async fn update_permission(
        &self,
        id: i64,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        let mut inner = self.inner.lock().await;
        let permission = inner
            .permissions
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ServiceError::NotFound("Permission"))?;
        permission.description = description.map(str::to_string);
        Ok(permission.clone())
    }

    async fn delete_permission(&self, id: i64) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        if !inner.permissions.iter().any(|p| p.id == id) {
            return Err(ServiceError::NotFound("Permission"));
        }
        inner.permissions.retain(|p| p.id != id);
        inner.role_permissions.retain(|rp| rp.permission_id != id);
        Ok(())
    }

    async fn roles_holding_permission(
        &self,
        permission_id: i64,
    ) -> Result<Vec<Role>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .role_permissions
            .iter()
            .filter(|rp| rp.permission_id == permission_id)
            .filter_map(|rp| inner.roles.iter().find(|r| r.id == rp.role_id).cloned())
            .collect())
    }

    async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        if !inner.principals.iter().any(|p| p.id == user_id) {
            return Err(ServiceError::NotFound("User"));
        }
        if !inner.roles.iter().any(|r| r.id == role_id) {
            return Err(ServiceError::NotFound("Role"));
        }
        if !inner
            .user_roles
            .iter()
            .any(|ur| ur.user_id == user_id && ur.role_id == role_id)
        {
            inner.user_roles.push(UserRole { user_id, role_id });
        }
        Ok(())
    }

    async fn unassign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        let mut inner = self.inner.lock().await;
        inner
            .user_roles
            .retain(|ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(())
    }

    async fn roles_of(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| inner.roles.iter().find(|r| r.id == ur.role_id).cloned())
            .collect())
    }

    async fn super_admin_holders(&self) -> Result<Vec<i64>, ServiceError> {
        let inner = self.inner.lock().await;
        let super_roles: Vec<i64> = inner
            .roles
            .iter()
            .filter(|r| r.is_super_admin)
            .map(|r| r.id)
            .collect();
        Ok(inner
            .user_roles
            .iter()
            .filter(|ur| super_roles.contains(&ur.role_id))
            .map(|ur| ur.user_id)
            .collect())
    }

    async fn permission_keys_for(&self, user_id: i64) -> Result<HashSet<String>, ServiceError> {
        let inner = self.inner.lock().await;
        let role_ids: Vec<i64> = inner
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .map(|ur| ur.role_id)
            .collect();
        Ok(inner
            .role_permissions
            .iter()
            .filter(|rp| role_ids.contains(&rp.role_id))
            .filter_map(|rp| {
                inner
                    .permissions
                    .iter()
                    .find(|p| p.id == rp.permission_id)
                    .map(|p| p.key.clone())
            })
            .collect())
    }
}

/// Narrow mutation interface over the registry store.
///
/// Every Super-Admin invariant is enforced here, before any store write:
/// the Super-Admin role is never deleted, edited, or stripped; its permission
/// grants cannot be hard-deleted; its last holder cannot be removed.
#[derive(Clone)]
pub struct RegistryService {
    store: Arc<dyn RegistryStore>,
}

impl RegistryService {
    pub fn new(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RegistryStore> {
        &self.store
    }

    /// Seed the Super-Admin role, principal, and assignment if missing.
    /// Establishes the "never empty" holder invariant at startup.
    pub async fn ensure_super_admin(
        &self,
        role_name: &str,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        let role = match self.store.find_role_by_name(role_name).await? {
            Some(role) => role,
            None => {
                self.store
                    .insert_role(role_name, Some("Highest level administrator"), true)
                    .await?
            }
        };

        let principal = match self.store.find_principal_by_username(username).await? {
            Some(principal) => principal,
            None => {
                self.store
                    .insert_principal(username, email, password_hash)
                    .await?
            }
        };

        let assigned = self
            .store
            .roles_of(principal.id)
            .await?
            .iter()
            .any(|r| r.id == role.id);
        if !assigned {
            self.store.assign_role(principal.id, role.id).await?;
        }

        // Baseline capability catalogue, granted in full to the Super-Admin
        // role so the seed account can administer a fresh installation.
        let mut grant_ids = Vec::with_capacity(keys::ALL.len());
        for key in keys::ALL {
            let permission = match self.store.find_permission_by_key(key).await? {
                Some(permission) => permission,
                None => self.store.insert_permission(key, None).await?,
            };
            grant_ids.push(permission.id);
        }

        let held: HashSet<i64> = self
            .store
            .role_permissions(role.id)
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        if grant_ids.iter().any(|id| !held.contains(id)) {
            let mut merged: Vec<i64> = held.into_iter().collect();
            for id in grant_ids {
                if !merged.contains(&id) {
                    merged.push(id);
                }
            }
            self.store.set_role_permissions(role.id, &merged).await?;
        }

        tracing::info!(role = %role.name, user_id = %principal.id, "Super-Admin seeded");
        Ok(())
    }

    // ==================== Users ====================

    pub async fn list_users(&self) -> Result<Vec<Principal>, ServiceError> {
        self.store.list_principals().await
    }

    pub async fn get_user(&self, id: i64) -> Result<(Principal, Vec<Role>), ServiceError> {
        let principal = self
            .store
            .find_principal(id)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;
        let roles = self.store.roles_of(id).await?;
        Ok((principal, roles))
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Principal, ServiceError> {
        self.store
            .insert_principal(username, email, password_hash)
            .await
    }

    pub async fn update_user(
        &self,
        id: i64,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Principal, ServiceError> {
        self.store.update_principal(id, email, password_hash).await
    }

    /// Delete a principal unless it is the last Super-Admin holder.
    pub async fn delete_user(&self, id: i64) -> Result<(), ServiceError> {
        if self.store.find_principal(id).await?.is_none() {
            return Err(ServiceError::NotFound("User"));
        }

        let holders = self.store.super_admin_holders().await?;
        let unique: HashSet<i64> = holders.into_iter().collect();
        if unique.len() == 1 && unique.contains(&id) {
            return Err(ServiceError::Forbidden("Cannot delete the last Super Admin"));
        }

        self.store.delete_principal(id).await
    }

    pub async fn assign_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        if self.store.find_role(role_id).await?.is_none() {
            return Err(ServiceError::NotFound("Role"));
        }
        self.store.assign_role(user_id, role_id).await
    }

    /// Remove a role assignment. The Super-Admin assignment is never
    /// removable, regardless of how many holders remain.
    pub async fn remove_role(&self, user_id: i64, role_id: i64) -> Result<(), ServiceError> {
        if let Some(role) = self.store.find_role(role_id).await? {
            if role.is_super_admin {
                return Err(ServiceError::Forbidden("Cannot remove Super Admin role"));
            }
        }
        self.store.unassign_role(user_id, role_id).await
    }

    // ==================== Roles ====================

    pub async fn list_roles(&self) -> Result<Vec<Role>, ServiceError> {
        self.store.list_roles().await
    }

    pub async fn get_role(&self, id: i64) -> Result<(Role, Vec<Permission>), ServiceError> {
        let role = self
            .store
            .find_role(id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        let permissions = self.store.role_permissions(id).await?;
        Ok((role, permissions))
    }

    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        permission_ids: &[i64],
    ) -> Result<Role, ServiceError> {
        for &id in permission_ids {
            if self.store.find_permission(id).await?.is_none() {
                return Err(ServiceError::NotFound("Permission"));
            }
        }
        let role = self.store.insert_role(name, description, false).await?;
        if !permission_ids.is_empty() {
            self.store
                .set_role_permissions(role.id, permission_ids)
                .await?;
        }
        Ok(role)
    }

    pub async fn update_role(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
    ) -> Result<Role, ServiceError> {
        let existing = self
            .store
            .find_role(id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        if existing.is_super_admin {
            return Err(ServiceError::Forbidden("Cannot modify Super Admin role"));
        }
        self.store.update_role(id, name, description).await
    }

    pub async fn delete_role(&self, id: i64) -> Result<(), ServiceError> {
        let existing = self
            .store
            .find_role(id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        if existing.is_super_admin {
            return Err(ServiceError::Forbidden("Cannot delete Super Admin role"));
        }
        self.store.delete_role(id).await
    }

    /// Replace a role's permission grants wholesale.
    pub async fn replace_role_permissions(
        &self,
        role_id: i64,
        permission_ids: &[i64],
    ) -> Result<(), ServiceError> {
        let role = self
            .store
            .find_role(role_id)
            .await?
            .ok_or(ServiceError::NotFound("Role"))?;
        if role.is_super_admin {
            return Err(ServiceError::Forbidden(
                "Cannot modify Super Admin permissions",
            ));
        }
        for &id in permission_ids {
            if self.store.find_permission(id).await?.is_none() {
                return Err(ServiceError::NotFound("Permission"));
            }
        }
        self.store.set_role_permissions(role_id, permission_ids).await
    }

    // ==================== Permissions ====================

    pub async fn list_permissions(&self) -> Result<Vec<Permission>, ServiceError> {
        self.store.list_permissions().await
    }

    pub async fn get_permission(&self, id: i64) -> Result<Permission, ServiceError> {
        self.store
            .find_permission(id)
            .await?
            .ok_or(ServiceError::NotFound("Permission"))
    }

    pub async fn create_permission(
        &self,
        key: &str,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        self.store.insert_permission(key, description).await
    }

    /// Update a permission's description. The key is its immutable identity.
    pub async fn update_permission(
        &self,
        id: i64,
        description: Option<&str>,
    ) -> Result<Permission, ServiceError> {
        self.store.update_permission(id, description).await
    }

    /// Strict deletion policy: a permission still granted to any role cannot
    /// be deleted; the Super-Admin grant gets the dedicated message.
    pub async fn delete_permission(&self, id: i64) -> Result<(), ServiceError> {
        if self.store.find_permission(id).await?.is_none() {
            return Err(ServiceError::NotFound("Permission"));
        }

        let holders = self.store.roles_holding_permission(id).await?;
        if holders.iter().any(|r| r.is_super_admin) {
            return Err(ServiceError::Forbidden(
                "Cannot remove a permission assigned to Super Admin",
            ));
        }
        if !holders.is_empty() {
            return Err(ServiceError::Forbidden("Permission still in use"));
        }

        self.store.delete_permission(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (RegistryService, i64, i64) {
        let service = RegistryService::new(Arc::new(MemoryRegistryStore::new()));
        service
            .ensure_super_admin("Super Admin", "superadmin", "admin@example.com", "hash")
            .await
            .unwrap();
        let role = service
            .store()
            .find_role_by_name("Super Admin")
            .await
            .unwrap()
            .unwrap();
        let admin = service
            .store()
            .find_principal_by_username("superadmin")
            .await
            .unwrap()
            .unwrap();
        (service, role.id, admin.id)
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let (service, _, admin_id) = seeded().await;

        service
            .ensure_super_admin("Super Admin", "superadmin", "admin@example.com", "hash")
            .await
            .unwrap();

        let roles: Vec<_> = service
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_super_admin)
            .collect();
        assert_eq!(roles.len(), 1);
        assert_eq!(service.store().super_admin_holders().await.unwrap(), vec![admin_id]);
    }

    #[tokio::test]
    async fn super_admin_role_cannot_be_edited_or_deleted() {
        let (service, role_id, _) = seeded().await;

        let err = service.update_role(role_id, "Renamed", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = service.delete_role(role_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        // State unchanged.
        let (role, _) = service.get_role(role_id).await.unwrap();
        assert_eq!(role.name, "Super Admin");
    }

    #[tokio::test]
    async fn super_admin_permissions_cannot_be_stripped() {
        let (service, role_id, _) = seeded().await;

        let err = service
            .replace_role_permissions(role_id, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn last_super_admin_cannot_be_deleted() {
        let (service, role_id, admin_id) = seeded().await;

        let err = service.delete_user(admin_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        assert!(service.get_user(admin_id).await.is_ok());

        // A second holder unblocks deletion of the first.
        let other = service
            .create_user("second", "second@example.com", "hash")
            .await
            .unwrap();
        service.assign_role(other.id, role_id).await.unwrap();
        service.delete_user(admin_id).await.unwrap();
    }

    #[tokio::test]
    async fn super_admin_assignment_cannot_be_removed() {
        let (service, role_id, admin_id) = seeded().await;

        let err = service.remove_role(admin_id, role_id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn permission_deletion_is_strict() {
        let (service, super_role_id, _) = seeded().await;

        let protected = service
            .create_permission("MANAGE_EVERYTHING", None)
            .await
            .unwrap();
        service
            .store()
            .set_role_permissions(super_role_id, &[protected.id])
            .await
            .unwrap();

        let err = service.delete_permission(protected.id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Forbidden("Cannot remove a permission assigned to Super Admin")
        ));

        let in_use = service.create_permission("VIEW_REPORTS", None).await.unwrap();
        let viewer = service.create_role("Viewer", None, &[in_use.id]).await.unwrap();
        let err = service.delete_permission(in_use.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden("Permission still in use")));

        // Detaching from the ordinary role makes it deletable.
        service.replace_role_permissions(viewer.id, &[]).await.unwrap();
        service.delete_permission(in_use.id).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_username_and_key_conflict() {
        let (service, _, _) = seeded().await;

        let err = service
            .create_user("superadmin", "x@example.com", "hash")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        service.create_permission("VIEW_X", None).await.unwrap();
        let err = service.create_permission("VIEW_X", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn permission_key_is_immutable_identity() {
        let (service, _, _) = seeded().await;

        let permission = service
            .create_permission("VIEW_REPORTS", Some("old"))
            .await
            .unwrap();
        let updated = service
            .update_permission(permission.id, Some("new"))
            .await
            .unwrap();

        assert_eq!(updated.key, "VIEW_REPORTS");
        assert_eq!(updated.description.as_deref(), Some("new"));
    }
}
