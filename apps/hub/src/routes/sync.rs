//! Server-originated sync events over plain HTTP
//!
//! - `POST /api/sync/play` - Tell every connected participant to play a track
//! - `POST /api/sync/pause` - Tell every connected participant to pause
//!
//! Both go through [`HubHandle::publish`], so they take the same freshness
//! and fan-out path as socket traffic, with no sender excluded.

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::websocket::{HubHandle, SyncMessage};

/// Shared state for sync handlers
#[derive(Debug, Clone)]
pub struct SyncState {
    pub hub: HubHandle,
}

impl SyncState {
    pub fn new(hub: HubHandle) -> Self {
        Self { hub }
    }
}

/// Create sync router: `/play` and `/pause`
pub fn sync_router(state: SyncState) -> Router {
    Router::new()
        .route("/play", post(play))
        .route("/pause", post(pause))
        .with_state(state)
}

// ========== Request/Response Types ==========

/// Play request body
#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub user_id: String,
    pub song_id: String,
    #[serde(default)]
    pub position: f64,
}

/// Pause request body
#[derive(Debug, Deserialize)]
pub struct PauseRequest {
    pub user_id: String,
    #[serde(default)]
    pub position: f64,
}

/// Publish outcome
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: String,
    /// Connections the event was queued for
    pub delivered: usize,
}

// ========== Validation ==========

fn require(field: &'static str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::MissingField(field));
    }
    Ok(())
}

fn validate_position(position: f64) -> ApiResult<()> {
    if !position.is_finite() || position < 0.0 {
        return Err(ApiError::ValidationError(format!(
            "position must be a non-negative number, got {}",
            position
        )));
    }
    Ok(())
}

// ========== Route Handlers ==========

/// Broadcast a play event
///
/// # Response
/// - 200 OK: `{"message": "Play sync sent", "delivered": n}`
/// - 400 Bad Request: missing `user_id`/`song_id`, negative position, bad JSON
/// - 503 Service Unavailable: hub stopped
async fn play(
    State(state): State<SyncState>,
    body: Result<Json<PlayRequest>, JsonRejection>,
) -> ApiResult<Json<SyncResponse>> {
    let Json(request) = body?;
    require("user_id", &request.user_id)?;
    require("song_id", &request.song_id)?;
    validate_position(request.position)?;

    let outcome = state
        .hub
        .publish(SyncMessage::play(
            request.user_id,
            request.song_id,
            request.position,
        ))
        .await?;

    Ok(Json(SyncResponse {
        message: "Play sync sent".to_string(),
        delivered: outcome.delivered,
    }))
}

/// Broadcast a pause event
///
/// # Response
/// - 200 OK: `{"message": "Pause sync sent", "delivered": n}`
/// - 400 Bad Request: missing `user_id`, negative position, bad JSON
/// - 503 Service Unavailable: hub stopped
async fn pause(
    State(state): State<SyncState>,
    body: Result<Json<PauseRequest>, JsonRejection>,
) -> ApiResult<Json<SyncResponse>> {
    let Json(request) = body?;
    require("user_id", &request.user_id)?;
    validate_position(request.position)?;

    let outcome = state
        .hub
        .publish(SyncMessage::pause(request.user_id, request.position))
        .await?;

    Ok(Json(SyncResponse {
        message: "Pause sync sent".to_string(),
        delivered: outcome.delivered,
    }))
}
