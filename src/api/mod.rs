//! API Layer Module
//!
//! HTTP server, routes and middleware.

pub mod middleware;
pub mod routes;
pub mod server;

// Re-exports for convenience
pub use middleware::{RateLimitConfig, RateLimitState, RateLimiter};
pub use routes::{create_router, ApiError, ErrorResponse};
pub use server::{start_server, AppState, SharedAppState};
