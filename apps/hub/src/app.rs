//! Router assembly

use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::routes::{health_router, sync_router, HealthState, SyncState};
use crate::websocket::{ws_router, HubHandle, WsState};

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ORIGINS` is set, only those origins are allowed
/// - If `CORS_ORIGINS` is not set, CORS requests are rejected (no origins allowed)
///
/// In development mode:
/// - If `CORS_ORIGINS` is set, those origins are used
/// - If `CORS_ORIGINS` is not set, permissive CORS is used for convenience
pub fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.server().cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s): {:?}",
                    allowed_origins.len(),
                    origins
                );
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([
                        header::CONTENT_TYPE,
                        header::ACCEPT,
                        header::ORIGIN,
                        header::HeaderName::from_static("user-id"),
                    ])
                    .max_age(std::time::Duration::from_secs(3600))
            }
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected. Set CORS_ORIGINS to allow cross-origin requests."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

/// Build the full application router around a running hub
///
/// - `/` banner
/// - `/health`, `/health/live`, `/health/ready`
/// - `/api/sync/play`, `/api/sync/pause`
/// - `/ws`, `/ws/:user_id`
pub fn build_router(config: Config, hub: HubHandle) -> Router {
    let cors_layer = build_cors_layer(&config);
    let config = Arc::new(config);

    let health_state = HealthState::new(config.clone(), hub.clone());
    let ws_state = WsState::new(hub.clone(), config.queue_capacity);

    Router::new()
        .route("/", get(root))
        .nest("/health", health_router(health_state))
        .nest("/api/sync", sync_router(SyncState::new(hub)))
        .nest("/ws", ws_router(ws_state))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
}

async fn root() -> &'static str {
    "Tandem - real-time playback sync hub"
}
