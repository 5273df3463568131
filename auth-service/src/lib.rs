pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::services::{AuthService, Database, RbacService, RegistryService};

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub registry: RegistryService,
    pub rbac: RbacService,
    pub database: Option<Database>,
}

pub fn build_router(state: AppState) -> Router {
    // Credential lifecycle; signup/signin/refresh carry their own proof.
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/auth/signup", post(handlers::auth::signup))
        .route("/auth/signin", post(handlers::auth::signin))
        .route("/auth/refresh", post(handlers::auth::refresh));

    // Everything below requires a live access credential. Capability checks
    // run inside each handler, after authentication has resolved the actor.
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users", get(handlers::users::list))
        .route("/users", post(handlers::users::create))
        .route("/users/:id", get(handlers::users::get))
        .route("/users/:id", patch(handlers::users::update))
        .route("/users/:id", delete(handlers::users::delete))
        .route("/users/:id/roles", post(handlers::users::assign_role))
        .route(
            "/users/:id/roles/:role_id",
            delete(handlers::users::remove_role),
        )
        .route("/roles", get(handlers::roles::list))
        .route("/roles", post(handlers::roles::create))
        .route("/roles/:id", get(handlers::roles::get))
        .route("/roles/:id", put(handlers::roles::update))
        .route("/roles/:id", delete(handlers::roles::delete))
        .route(
            "/roles/:id/permissions",
            put(handlers::roles::set_permissions),
        )
        .route("/permissions", get(handlers::permissions::list))
        .route("/permissions", post(handlers::permissions::create))
        .route("/permissions/:id", get(handlers::permissions::get))
        .route("/permissions/:id", patch(handlers::permissions::update))
        .route("/permissions/:id", delete(handlers::permissions::delete))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    public_routes
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
