//! Error taxonomy for the sync core
//!
//! Every variant is contained at the connection boundary: none of them
//! is allowed to stop the hub loop.

use thiserror::Error;

/// Errors that can occur while relaying sync messages
#[derive(Debug, Error)]
pub enum SyncError {
    /// Payload is not a JSON object or violates the message schema.
    /// Only the offending message is dropped.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Message is older than the freshness window. Dropped silently.
    #[error("stale message: {age_secs}s old, window is {window_secs}s")]
    StaleMessage { age_secs: i64, window_secs: u64 },

    /// Outbound queue is full. Fatal to that one connection.
    #[error("slow consumer: outbound queue is full")]
    SlowConsumer,

    /// Socket read/write failed or the outbound queue is gone.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The hub loop has stopped and no longer accepts commands
    #[error("hub is not running")]
    HubUnavailable,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error ends the connection it occurred on
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::SlowConsumer | Self::TransportFailure(_) | Self::HubUnavailable
        )
    }
}
