//! Domain entities persisted by the registry and token stores.

mod permission;
mod role;
mod token;
mod user;

pub use permission::{keys, Permission};
pub use role::{Role, RolePermission, RoleWithPermissions};
pub use token::{TokenKind, TokenRecord};
pub use user::{Principal, PrincipalWithRoles, SanitizedPrincipal, UserRole};
