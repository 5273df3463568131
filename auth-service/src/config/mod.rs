use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

/// Service configuration, loaded from `configuration.*` files and
/// `APP__`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Bound on pool acquisition; a timeout surfaces as `StoreUnavailable`
    /// instead of hanging the request.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_minutes: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub endpoint: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self { endpoint: None }
    }
}

/// Super-Admin seed identity, applied at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(default = "default_seed_role")]
    pub role_name: String,
    #[serde(default = "default_seed_username")]
    pub username: String,
    #[serde(default = "default_seed_email")]
    pub email: String,
    /// Initial plaintext password for the seed principal; hashed before
    /// storage. Required on first boot of an empty database.
    pub password: Option<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            role_name: default_seed_role(),
            username: default_seed_username(),
            email: default_seed_email(),
            password: None,
        }
    }
}

fn default_service_name() -> String {
    "auth-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> u64 {
    3
}

fn default_access_ttl() -> i64 {
    15
}

fn default_refresh_ttl() -> i64 {
    7
}

fn default_seed_role() -> String {
    "Super Admin".to_string()
}

fn default_seed_username() -> String {
    "superadmin".to_string()
}

fn default_seed_email() -> String {
    "admin@example.com".to_string()
}

impl AuthConfig {
    /// Load configuration, failing fast on anything malformed.
    pub fn from_env() -> Result<Self, AppError> {
        let config = core_config::builder()?;
        Ok(config.try_deserialize()?)
    }
}
