//! Services layer: the token lifecycle engine and the permission evaluator,
//! plus the storage traits they stand on.

mod auth;
mod database;
pub mod error;
mod jwt;
mod notifier;
pub mod rbac;
pub mod registry;
pub mod token_store;

pub use auth::{AuthContext, AuthService};
pub use database::{Database, PgRegistryStore, PgTokenStore};
pub use error::ServiceError;
pub use jwt::{Claims, IssuedPair, JwtService, SignedCredential, TokenResponse};
pub use notifier::{CredentialNotifier, HttpNotifier, NoopNotifier};
pub use rbac::RbacService;
pub use registry::{MemoryRegistryStore, RegistryService, RegistryStore};
pub use token_store::{MemoryTokenStore, RefreshConsumption, TokenStore};
