//! HTTP API handlers for onboard-sim
//!
//! REST endpoints over the session engine; every handler delegates to it and
//! maps `SessionError` to a status code.

pub mod health;
pub mod sessions;

pub use health::health_routes;
pub use sessions::session_routes;
