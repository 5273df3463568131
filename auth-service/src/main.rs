use std::net::SocketAddr;
use std::sync::Arc;

use auth_service::config::AuthConfig;
use auth_service::services::{
    AuthService, Database, HttpNotifier, JwtService, NoopNotifier, PgRegistryStore, PgTokenStore,
    RbacService, RegistryService, ServiceError,
};
use auth_service::utils::{hash_password, Password};
use auth_service::{build_router, AppState};
use service_core::observability::logging::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(service = %config.service_name, "Starting authentication service");

    let database = Database::connect(&config.database).await?;
    database.migrate().await?;
    tracing::info!("Database initialized");

    let jwt = JwtService::new(&config.jwt)?;

    let registry_store = Arc::new(PgRegistryStore::new(&database));
    let token_store = Arc::new(PgTokenStore::new(&database));

    let notifier: Arc<dyn auth_service::services::CredentialNotifier> =
        match &config.notifier.endpoint {
            Some(endpoint) => Arc::new(HttpNotifier::new(endpoint)),
            None => Arc::new(NoopNotifier),
        };

    let registry = RegistryService::new(registry_store.clone());
    let rbac = RbacService::new(registry_store.clone());
    let auth = AuthService::new(registry_store, token_store, jwt, notifier);

    seed_super_admin(&registry, &config).await?;

    let state = AppState {
        auth,
        registry,
        rbac,
        database: Some(database),
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Apply the Super-Admin seed so the holder set is never empty. Skipped
/// when no seed password is configured and the identities already exist.
async fn seed_super_admin(
    registry: &RegistryService,
    config: &AuthConfig,
) -> Result<(), ServiceError> {
    let Some(password) = &config.seed.password else {
        tracing::warn!("No seed password configured; skipping Super-Admin seed");
        return Ok(());
    };

    let hash =
        hash_password(&Password::new(password.clone())).map_err(ServiceError::Internal)?;
    registry
        .ensure_super_admin(
            &config.seed.role_name,
            &config.seed.username,
            &config.seed.email,
            hash.as_str(),
        )
        .await?;
    tracing::info!(role = %config.seed.role_name, "Super-Admin seed applied");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
