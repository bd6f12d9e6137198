//! Tandem hub library
//!
//! Exposes the sync core and the HTTP surface for use in integration tests
//! and by Rust clients that want the same message types.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod websocket;

// Re-export commonly used types
pub use app::build_router;
pub use config::Config;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use websocket::{FreshnessFilter, Hub, HubHandle, SyncError, SyncMessage};
