//! HTTP-level tests: routing, guard ordering, and error status mapping.

use std::sync::Arc;

use auth_service::config::JwtConfig;
use auth_service::services::{
    AuthService, JwtService, MemoryRegistryStore, MemoryTokenStore, NoopNotifier, RbacService,
    RegistryService,
};
use auth_service::utils::{hash_password, Password};
use auth_service::{build_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

async fn test_app() -> Router {
    let registry_store = Arc::new(MemoryRegistryStore::new());
    let token_store = Arc::new(MemoryTokenStore::new());
    let jwt = JwtService::new(&JwtConfig {
        access_secret: "access-secret-for-tests".to_string(),
        refresh_secret: "refresh-secret-for-tests".to_string(),
        access_ttl_minutes: 15,
        refresh_ttl_days: 7,
    })
    .unwrap();

    let registry = RegistryService::new(registry_store.clone());
    let hash = hash_password(&Password::new("Root1!pass".to_string())).unwrap();
    registry
        .ensure_super_admin("Super Admin", "root", "root@example.com", hash.as_str())
        .await
        .unwrap();

    build_router(AppState {
        auth: AuthService::new(
            registry_store.clone(),
            token_store,
            jwt,
            Arc::new(NoopNotifier),
        ),
        registry,
        rbac: RbacService::new(registry_store),
        database: None,
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn signin(app: &Router, username: &str, password: &str) -> Value {
    let (status, body) = send(
        app,
        post_json(
            "/auth/signin",
            json!({ "username": username, "password": password }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_reports_ok() {
    let app = test_app().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn signup_returns_a_credential_pair() {
    let app = test_app().await;
    let (status, body) = send(
        &app,
        post_json(
            "/auth/signup",
            json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "Aa1!aaaa"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["access_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
async fn signup_rejects_a_short_password() {
    let app = test_app().await;
    let (status, _) = send(
        &app,
        post_json(
            "/auth/signup",
            json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "short"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn duplicate_username_conflicts() {
    let app = test_app().await;
    let payload = json!({
        "username": "alice",
        "email": "alice@example.com",
        "password": "Aa1!aaaa"
    });
    let (status, _) = send(&app, post_json("/auth/signup", payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(&app, post_json("/auth/signup", payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn management_routes_require_authentication() {
    let app = test_app().await;
    let request = Request::builder()
        .uri("/users")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, authed("GET", "/users", "not-a-jwt", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn capability_check_runs_after_authentication() {
    let app = test_app().await;
    let (_, issued) = send(
        &app,
        post_json(
            "/auth/signup",
            json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "Aa1!aaaa"
            }),
        ),
    )
    .await;
    let token = issued["access_token"].as_str().unwrap();

    // Authenticated but holding no roles at all.
    let (status, _) = send(&app, authed("GET", "/users", token, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn super_admin_can_manage_the_registry() {
    let app = test_app().await;
    let issued = signin(&app, "root", "Root1!pass").await;
    let token = issued["access_token"].as_str().unwrap();

    let (status, users) = send(&app, authed("GET", "/users", token, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 1);

    let (status, role) = send(
        &app,
        authed(
            "POST",
            "/roles",
            token,
            Some(json!({ "name": "Viewer", "description": "Read only" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["name"], "Viewer");

    let (status, _) = send(
        &app,
        authed(
            "DELETE",
            &format!("/roles/{}", role["id"]),
            token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn super_admin_role_refuses_deletion_over_http() {
    let app = test_app().await;
    let issued = signin(&app, "root", "Root1!pass").await;
    let token = issued["access_token"].as_str().unwrap();

    let (_, roles) = send(&app, authed("GET", "/roles", token, None)).await;
    let super_admin = roles
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["name"] == "Super Admin")
        .unwrap();

    let (status, _) = send(
        &app,
        authed(
            "DELETE",
            &format!("/roles/{}", super_admin["id"]),
            token,
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn refresh_rotates_and_replay_fails() {
    let app = test_app().await;
    let first = signin(&app, "root", "Root1!pass").await;
    let rt1 = first["refresh_token"].as_str().unwrap();

    let (status, second) = send(
        &app,
        post_json("/auth/refresh", json!({ "refresh_token": rt1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(second["refresh_token"].as_str().unwrap(), rt1);

    let (status, _) = send(
        &app,
        post_json("/auth/refresh", json!({ "refresh_token": rt1 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = test_app().await;
    let issued = signin(&app, "root", "Root1!pass").await;
    let token = issued["access_token"].as_str().unwrap();

    let (status, _) = send(&app, authed("POST", "/auth/logout", token, None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, authed("GET", "/users", token, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &app,
        post_json(
            "/auth/refresh",
            json!({ "refresh_token": issued["refresh_token"].as_str().unwrap() }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
