//! API endpoint modules.

pub mod auth;
pub mod health;

pub use auth::{configure_auth_routes, configure_session_routes};
pub use health::configure_health_routes;
