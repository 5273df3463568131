//! Thin HTTP dispatch over the services layer. No decision logic lives here.

pub mod auth;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;
