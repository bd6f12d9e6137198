//! HTTP route handlers for the Tandem hub
//!
//! - Health check and readiness endpoints
//! - Server-originated sync events

pub mod health;
pub mod sync;

pub use health::{health_router, HealthState};
pub use sync::{sync_router, SyncState};
