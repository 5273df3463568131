//! Credential lifecycle tests over the in-memory stores.

use std::sync::Arc;

use auth_service::config::JwtConfig;
use auth_service::dtos::auth::{SigninRequest, SignupRequest};
use auth_service::services::{
    AuthService, JwtService, MemoryRegistryStore, MemoryTokenStore, NoopNotifier, RbacService,
    RegistryService, ServiceError, TokenResponse,
};

fn jwt_config() -> JwtConfig {
    JwtConfig {
        access_secret: "access-secret-for-tests".to_string(),
        refresh_secret: "refresh-secret-for-tests".to_string(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
    }
}

struct Harness {
    auth: AuthService,
    registry: RegistryService,
    rbac: RbacService,
}

fn harness_with(jwt: JwtConfig) -> Harness {
    let registry_store = Arc::new(MemoryRegistryStore::new());
    let token_store = Arc::new(MemoryTokenStore::new());
    let jwt = JwtService::new(&jwt).unwrap();

    Harness {
        auth: AuthService::new(
            registry_store.clone(),
            token_store,
            jwt,
            Arc::new(NoopNotifier),
        ),
        registry: RegistryService::new(registry_store.clone()),
        rbac: RbacService::new(registry_store),
    }
}

fn harness() -> Harness {
    harness_with(jwt_config())
}

async fn signup_alice(h: &Harness) -> TokenResponse {
    h.auth
        .signup(SignupRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "Aa1!aaaa".to_string(),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn signup_signin_and_validate() {
    let h = harness();
    let issued = signup_alice(&h).await;

    assert_eq!(issued.token_type, "Bearer");
    assert!(issued.expires_in > 0);

    let context = h.auth.validate_access(&issued.access_token).await.unwrap();
    assert_eq!(context.username, "alice");

    let again = h
        .auth
        .signin(SigninRequest {
            username: "alice".to_string(),
            password: "Aa1!aaaa".to_string(),
        })
        .await
        .unwrap();
    h.auth.validate_access(&again.access_token).await.unwrap();

    // Pairs from separate signins are independent sessions.
    h.auth.validate_access(&issued.access_token).await.unwrap();
}

#[tokio::test]
async fn wrong_password_and_unknown_user_are_indistinguishable() {
    let h = harness();
    signup_alice(&h).await;

    let wrong = h
        .auth
        .signin(SigninRequest {
            username: "alice".to_string(),
            password: "not-the-password".to_string(),
        })
        .await
        .unwrap_err();
    let unknown = h
        .auth
        .signin(SigninRequest {
            username: "nobody".to_string(),
            password: "Aa1!aaaa".to_string(),
        })
        .await
        .unwrap_err();

    assert!(matches!(wrong, ServiceError::InvalidCredentials));
    assert!(matches!(unknown, ServiceError::InvalidCredentials));
}

#[tokio::test]
async fn rotation_invalidates_the_consumed_pair() {
    let h = harness();
    let first = signup_alice(&h).await;

    let second = h
        .auth
        .refresh_presented(&first.refresh_token)
        .await
        .unwrap();
    assert_ne!(second.refresh_token, first.refresh_token);

    // The access half of the consumed pair dies with it.
    let err = h
        .auth
        .validate_access(&first.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // Replaying the rotated refresh credential fails closed.
    let err = h
        .auth
        .refresh_presented(&first.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(m) if m == "already rotated"));

    // The fresh pair works.
    h.auth.validate_access(&second.access_token).await.unwrap();
    h.auth
        .refresh_presented(&second.refresh_token)
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_rotation_succeeds_at_most_once() {
    let h = harness();
    let issued = signup_alice(&h).await;

    let (a, b) = tokio::join!(
        h.auth.refresh_presented(&issued.refresh_token),
        h.auth.refresh_presented(&issued.refresh_token),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);

    let loser = if a.is_err() { a } else { b };
    assert!(matches!(
        loser.unwrap_err(),
        ServiceError::Unauthorized(m) if m == "already rotated"
    ));
}

#[tokio::test]
async fn logout_revokes_every_credential() {
    let h = harness();
    let first = signup_alice(&h).await;
    let second = h
        .auth
        .signin(SigninRequest {
            username: "alice".to_string(),
            password: "Aa1!aaaa".to_string(),
        })
        .await
        .unwrap();

    let context = h.auth.validate_access(&first.access_token).await.unwrap();
    h.auth
        .logout(context.principal_id, &first.access_token)
        .await
        .unwrap();

    for token in [&first.access_token, &second.access_token] {
        let err = h.auth.validate_access(token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
    for token in [&first.refresh_token, &second.refresh_token] {
        let err = h.auth.refresh_presented(token).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}

#[tokio::test]
async fn logout_with_dead_credential_is_forbidden() {
    let h = harness();
    let issued = signup_alice(&h).await;
    let context = h.auth.validate_access(&issued.access_token).await.unwrap();

    h.auth
        .logout(context.principal_id, &issued.access_token)
        .await
        .unwrap();

    let err = h
        .auth
        .logout(context.principal_id, &issued.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn expired_access_credential_is_rejected_structurally() {
    let h = harness_with(JwtConfig {
        access_ttl_minutes: -1,
        ..jwt_config()
    });
    let issued = signup_alice(&h).await;

    let err = h
        .auth
        .validate_access(&issued.access_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(m) if m == "expired"));
}

#[tokio::test]
async fn tampered_credential_is_rejected() {
    let h = harness();
    let issued = signup_alice(&h).await;

    let mut tampered = issued.access_token.clone();
    tampered.push('x');
    let err = h.auth.validate_access(&tampered).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // A refresh credential is structurally valid but signed with the other
    // secret; it must not pass access validation.
    let err = h
        .auth
        .validate_access(&issued.refresh_token)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));
}

#[tokio::test]
async fn registry_edits_take_effect_on_the_next_check() {
    let h = harness();
    let issued = signup_alice(&h).await;
    let context = h.auth.validate_access(&issued.access_token).await.unwrap();

    let view = h
        .registry
        .create_permission("VIEW_USER_LIST", None)
        .await
        .unwrap();
    let delete = h
        .registry
        .create_permission("DELETE_USER", None)
        .await
        .unwrap();
    let viewer = h
        .registry
        .create_role("Viewer", None, &[view.id])
        .await
        .unwrap();
    h.registry
        .assign_role(context.principal_id, viewer.id)
        .await
        .unwrap();

    h.rbac
        .authorize(context.principal_id, &["VIEW_USER_LIST"])
        .await
        .unwrap();
    let err = h
        .rbac
        .authorize(context.principal_id, &["VIEW_USER_LIST", "DELETE_USER"])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    // Widening the role is visible without reissuing any credential.
    h.registry
        .replace_role_permissions(viewer.id, &[view.id, delete.id])
        .await
        .unwrap();
    h.rbac
        .authorize(context.principal_id, &["VIEW_USER_LIST", "DELETE_USER"])
        .await
        .unwrap();

    // So is narrowing it back down.
    h.registry
        .replace_role_permissions(viewer.id, &[view.id])
        .await
        .unwrap();
    let err = h
        .rbac
        .authorize(context.principal_id, &["DELETE_USER"])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn super_admin_invariants_hold_end_to_end() {
    let h = harness();
    h.registry
        .ensure_super_admin("Super Admin", "root", "root@example.com", "hash")
        .await
        .unwrap();

    let root = h
        .registry
        .store()
        .find_principal_by_username("root")
        .await
        .unwrap()
        .unwrap();
    let role = h
        .registry
        .store()
        .find_role_by_name("Super Admin")
        .await
        .unwrap()
        .unwrap();

    // Seed grants the full baseline catalogue.
    h.rbac
        .authorize(root.id, &["VIEW_USER_LIST", "DELETE_PERMISSION"])
        .await
        .unwrap();

    // Last holder cannot be deleted, role cannot be edited or removed, the
    // assignment cannot be stripped, and held permissions cannot be dropped.
    assert!(matches!(
        h.registry.delete_user(root.id).await.unwrap_err(),
        ServiceError::Forbidden(_)
    ));
    assert!(matches!(
        h.registry.update_role(role.id, "Renamed", None).await.unwrap_err(),
        ServiceError::Forbidden(_)
    ));
    assert!(matches!(
        h.registry.delete_role(role.id).await.unwrap_err(),
        ServiceError::Forbidden(_)
    ));
    assert!(matches!(
        h.registry.remove_role(root.id, role.id).await.unwrap_err(),
        ServiceError::Forbidden(_)
    ));

    let held = h.registry.store().role_permissions(role.id).await.unwrap();
    assert!(matches!(
        h.registry.delete_permission(held[0].id).await.unwrap_err(),
        ServiceError::Forbidden(_)
    ));

    // All of the above left the registry unchanged.
    assert!(h
        .registry
        .store()
        .find_principal(root.id)
        .await
        .unwrap()
        .is_some());
    let holders = h.registry.store().super_admin_holders().await.unwrap();
    assert_eq!(holders, vec![root.id]);

    // A second holder makes principal deletion legal again.
    let other = h
        .registry
        .create_user("backup", "backup@example.com", "hash")
        .await
        .unwrap();
    h.registry.assign_role(other.id, role.id).await.unwrap();
    h.registry.delete_user(root.id).await.unwrap();
}
