use std::sync::Arc;

use crate::services::registry::RegistryStore;
use crate::services::ServiceError;

/// Capability evaluator.
///
/// Re-reads the role/permission graph on every call so that registry edits
/// take effect immediately; nothing is cached across requests. Denials are
/// generic and never name the missing capability.
#[derive(Clone)]
pub struct RbacService {
    registry: Arc<dyn RegistryStore>,
}

impl RbacService {
    pub fn new(registry: Arc<dyn RegistryStore>) -> Self {
        Self { registry }
    }

    /// Allow only when every required capability is present in the union of
    /// permission keys reachable through the principal's role assignments.
    pub async fn authorize(
        &self,
        principal_id: i64,
        required: &[&str],
    ) -> Result<(), ServiceError> {
        if self.registry.find_principal(principal_id).await?.is_none() {
            return Err(ServiceError::Forbidden("Insufficient permissions"));
        }

        let granted = self.registry.permission_keys_for(principal_id).await?;
        if granted.is_empty() {
            return Err(ServiceError::Forbidden("Insufficient permissions"));
        }

        if required.iter().all(|key| granted.contains(*key)) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Insufficient permissions"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::registry::{MemoryRegistryStore, RegistryService};

    async fn fixture(granted: &[&str]) -> (RbacService, i64) {
        let store = Arc::new(MemoryRegistryStore::new());
        let registry = RegistryService::new(store.clone());

        let user = registry
            .create_user("worker", "worker@example.com", "hash")
            .await
            .unwrap();

        let mut ids = Vec::new();
        for key in granted {
            ids.push(registry.create_permission(key, None).await.unwrap().id);
        }
        let role = registry.create_role("Worker", None, &ids).await.unwrap();
        registry.assign_role(user.id, role.id).await.unwrap();

        (RbacService::new(store), user.id)
    }

    #[tokio::test]
    async fn all_required_capabilities_must_be_present() {
        let (rbac, user_id) = fixture(&["A", "B"]).await;

        assert!(rbac.authorize(user_id, &["A", "B"]).await.is_ok());
        assert!(rbac.authorize(user_id, &["A"]).await.is_ok());

        let err = rbac.authorize(user_id, &["A", "B", "C"]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_principal_is_denied() {
        let (rbac, _) = fixture(&["A"]).await;

        let err = rbac.authorize(9999, &["A"]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn empty_capability_set_is_denied() {
        let store = Arc::new(MemoryRegistryStore::new());
        let registry = RegistryService::new(store.clone());
        let user = registry
            .create_user("bare", "bare@example.com", "hash")
            .await
            .unwrap();

        let rbac = RbacService::new(store);
        let err = rbac.authorize(user.id, &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[tokio::test]
    async fn registry_edits_take_effect_immediately() {
        let store = Arc::new(MemoryRegistryStore::new());
        let registry = RegistryService::new(store.clone());
        let rbac = RbacService::new(store);

        let user = registry
            .create_user("viewer", "viewer@example.com", "hash")
            .await
            .unwrap();
        let view = registry
            .create_permission("VIEW_USER_LIST", None)
            .await
            .unwrap();
        let role = registry
            .create_role("Viewer", None, &[view.id])
            .await
            .unwrap();
        registry.assign_role(user.id, role.id).await.unwrap();

        assert!(rbac.authorize(user.id, &["VIEW_USER_LIST"]).await.is_ok());
        assert!(rbac.authorize(user.id, &["DELETE_USER"]).await.is_err());

        // No cross-request cache: stripping the role denies at once.
        registry.replace_role_permissions(role.id, &[]).await.unwrap();
        assert!(rbac.authorize(user.id, &["VIEW_USER_LIST"]).await.is_err());
    }
}
