//! Health check HTTP route handlers
//!
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/ready` - Readiness check (asks the hub loop for its stats)
//! - `GET /health/live` - Kubernetes-style liveness probe

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

use crate::config::Config;
use crate::websocket::HubHandle;

/// Shared application state for health check handlers
#[derive(Clone)]
pub struct HealthState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Handle to the running hub
    pub hub: HubHandle,
}

impl HealthState {
    pub fn new(config: Arc<Config>, hub: HubHandle) -> Self {
        Self { config, hub }
    }
}

/// Create health check router
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
        .with_state(state)
}

/// Simple health check - always returns OK if the server is running
async fn simple_health() -> &'static str {
    "OK"
}

/// Liveness probe for Kubernetes
///
/// Does not touch the hub; that's what readiness is for.
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe - round-trips a stats request through the hub mailbox
///
/// # Response
/// - 200 OK with hub stats while the hub loop is running
/// - 503 Service Unavailable once it has stopped
async fn readiness_probe(State(state): State<HealthState>) -> impl IntoResponse {
    match state.hub.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "environment": state.config.environment().to_string(),
                "hub": stats,
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unavailable",
                    "environment": state.config.environment().to_string(),
                    "error": e.to_string(),
                })),
            )
        }
    }
}
