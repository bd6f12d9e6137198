//! WebSocket upgrade handler and per-socket read/write paths
//!
//! Each socket becomes one [`Connection`] registered with the hub. The
//! write path drains the connection's outbound queue into the socket; the
//! read path decodes inbound frames and hands them to the hub. Whichever
//! path ends first aborts the other, and the connection is unregistered
//! exactly once.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use uuid::Uuid;

use super::connection::{Connection, ConnectionId, Frame, Registration};
use super::error::SyncError;
use super::hub::HubHandle;
use super::messages::decode;

/// Header carrying the participant id when it is not in the path
pub const PARTICIPANT_HEADER: &str = "User-ID";

/// Largest inbound frame accepted from a client
const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Shared state for websocket routes
#[derive(Debug, Clone)]
pub struct WsState {
    pub hub: HubHandle,
    /// Outbound queue capacity for each new connection
    pub queue_capacity: usize,
}

impl WsState {
    pub fn new(hub: HubHandle, queue_capacity: usize) -> Self {
        Self {
            hub,
            queue_capacity,
        }
    }
}

/// Create websocket router: `/` and `/:user_id`
pub fn ws_router(state: WsState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/:user_id", get(ws_handler_with_id))
        .with_state(state)
}

/// Validate participant id format
fn validate_participant_id(participant_id: &str) -> Result<(), &'static str> {
    if participant_id.is_empty() {
        return Err("user_id cannot be empty");
    }
    if participant_id.len() > 128 {
        return Err("user_id must be at most 128 characters");
    }
    if !participant_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err("user_id contains invalid characters");
    }
    Ok(())
}

/// Upgrade with the participant id taken from the path
pub async fn ws_handler_with_id(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<WsState>,
) -> Response {
    upgrade(ws, user_id, state)
}

/// Upgrade with the participant id from the `User-ID` header, or a fresh one
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<WsState>,
) -> Response {
    let user_id = headers
        .get(PARTICIPANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    upgrade(ws, user_id, state)
}

fn upgrade(ws: WebSocketUpgrade, participant_id: String, state: WsState) -> Response {
    let ws = ws.max_message_size(MAX_FRAME_BYTES);

    if let Err(e) = validate_participant_id(&participant_id) {
        tracing::warn!(participant_id = %participant_id, "Invalid participant id: {}", e);
        return ws.on_upgrade(move |mut socket| async move {
            let body = serde_json::json!({ "error": "INVALID_USER_ID", "message": e });
            let _ = socket.send(Message::Text(body.to_string())).await;
            let _ = socket.close().await;
        });
    }

    tracing::info!(participant_id = %participant_id, "WebSocket upgrade accepted");

    ws.on_upgrade(move |socket| handle_socket(socket, participant_id, state))
}

/// Turn a queued frame into a websocket message
fn frame_to_message(frame: Frame) -> Message {
    match String::from_utf8(frame.to_vec()) {
        Ok(text) => Message::Text(text),
        Err(e) => Message::Binary(e.into_bytes()),
    }
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, participant_id: String, state: WsState) {
    let (connection, mut queue) = Connection::new(participant_id.clone(), state.queue_capacity);
    let connection_id = connection.id();

    if let Err(e) = state.hub.register(connection).await {
        tracing::warn!(
            participant_id = %participant_id,
            error = %e,
            "Could not register connection"
        );
        let _ = socket.close().await;
        return;
    }

    let registration = queue.registration();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Write path
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = ws_sender.send(frame_to_message(frame)).await {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %SyncError::TransportFailure(e.to_string()),
                    "WebSocket send failed"
                );
                return;
            }
        }
        // Queue closed by the hub and fully drained
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // Read path
    let hub = state.hub.clone();
    let reader_participant = participant_id.clone();
    let mut recv_task = tokio::spawn(async move {
        read_loop(
            &mut ws_receiver,
            &hub,
            connection_id,
            &reader_participant,
            &registration,
        )
        .await;
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    if let Err(e) = state.hub.unregister(connection_id).await {
        tracing::debug!(connection_id = %connection_id, error = %e, "Unregister skipped");
    }

    tracing::info!(
        connection_id = %connection_id,
        participant_id = %participant_id,
        "WebSocket connection closed"
    );
}

async fn read_loop<S>(
    ws_receiver: &mut S,
    hub: &HubHandle,
    connection_id: ConnectionId,
    participant_id: &str,
    registration: &Registration,
) where
    S: futures_util::Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(result) = ws_receiver.next().await {
        let payload = match result {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(data)) => data,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %SyncError::TransportFailure(e.to_string()),
                    "WebSocket error"
                );
                break;
            }
        };

        let mut message = match decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(
                    connection_id = %connection_id,
                    error = %e,
                    "Dropping malformed payload"
                );
                continue;
            }
        };

        // Evicted while the write path is still flushing
        if !registration.is_registered() {
            tracing::debug!(connection_id = %connection_id, "Connection evicted, stop reading");
            break;
        }

        if message.user_id.is_none() {
            message.user_id = Some(participant_id.to_string());
        }

        if let Err(e) = hub.broadcast(message, connection_id).await {
            tracing::warn!(connection_id = %connection_id, error = %e, "Broadcast failed");
            if e.is_fatal_to_connection() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_validate_participant_id_valid() {
        assert!(validate_participant_id("user-123").is_ok());
        assert!(validate_participant_id("user_123").is_ok());
        assert!(validate_participant_id("a").is_ok());
        assert!(validate_participant_id(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_validate_participant_id_invalid() {
        assert!(validate_participant_id("").is_err());
        assert!(validate_participant_id(&"a".repeat(129)).is_err());
        assert!(validate_participant_id("user<script>").is_err());
        assert!(validate_participant_id("user with spaces").is_err());
        assert!(validate_participant_id("user.name").is_err());
    }

    #[test]
    fn test_frame_to_message() {
        assert!(matches!(
            frame_to_message(Bytes::from_static(br#"{"type":"play"}"#)),
            Message::Text(ref t) if t == r#"{"type":"play"}"#
        ));
        assert!(matches!(
            frame_to_message(Bytes::from_static(&[0xff, 0xfe])),
            Message::Binary(ref b) if b == &[0xff, 0xfe]
        ));
    }

    #[tokio::test]
    async fn test_read_loop_relays_and_skips_malformed() {
        use crate::websocket::hub::Hub;

        let hub = Hub::default().spawn(16);
        let (sender, sender_queue) = Connection::new("alice", 8);
        let sender_id = sender.id();
        let (peer, mut peer_queue) = Connection::new("bob", 8);
        hub.register(sender).await.unwrap();
        hub.register(peer).await.unwrap();

        let inbound: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Text("not json".into())),
            Ok(Message::Ping(vec![1])),
            Ok(Message::Text(r#"{"type":"seek","position":4}"#.into())),
            Ok(Message::Close(None)),
            Ok(Message::Text(r#"{"type":"pause"}"#.into())),
        ];
        let mut stream = futures_util::stream::iter(inbound);

        read_loop(
            &mut stream,
            &hub,
            sender_id,
            "alice",
            &sender_queue.registration(),
        )
        .await;

        let frame = peer_queue.recv().await.unwrap();
        let relayed = decode(&frame).unwrap();
        assert_eq!(relayed.position, Some(4.0));
        assert_eq!(relayed.user_id.as_deref(), Some("alice"));

        // nothing after the close frame was relayed
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.broadcasts, 1);
    }

    #[tokio::test]
    async fn test_read_loop_stops_once_evicted() {
        use crate::websocket::hub::Hub;
        use crate::websocket::messages::SyncMessage;

        let hub = Hub::default().spawn(16);
        let (sender, sender_queue) = Connection::new("alice", 1);
        let sender_id = sender.id();
        let (peer, mut peer_queue) = Connection::new("bob", 8);
        hub.register(sender).await.unwrap();
        hub.register(peer).await.unwrap();

        // alice never drains, so the second publish evicts her
        hub.publish(SyncMessage::pause("dj", 1.0)).await.unwrap();
        let outcome = hub.publish(SyncMessage::pause("dj", 2.0)).await.unwrap();
        assert_eq!(outcome.evicted, 1);
        assert!(!sender_queue.is_registered());
        while peer_queue.try_recv().is_some() {}

        let inbound: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Text(r#"{"type":"seek","position":4}"#.into())),
            Ok(Message::Text(r#"{"type":"seek","position":5}"#.into())),
        ];
        let mut stream = futures_util::stream::iter(inbound);

        read_loop(
            &mut stream,
            &hub,
            sender_id,
            "alice",
            &sender_queue.registration(),
        )
        .await;

        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.broadcasts, 2);
        assert!(peer_queue.try_recv().is_none());
    }
}
