//! HTTP API module for markets, users, sandboxes and health/metrics endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::{ApiError, AppState};
pub use routes::create_router;
