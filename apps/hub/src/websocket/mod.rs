//! Real-time playback synchronization over WebSockets
//!
//! This module handles:
//! - Decoding and encoding sync messages
//! - Registering participant connections with the hub
//! - Freshness filtering and fan-out to every other participant
//! - Consumer-side interpretation of relayed messages

pub mod connection;
pub mod error;
pub mod freshness;
pub mod handler;
pub mod hub;
pub mod messages;
pub mod policy;
pub mod presence;

pub use connection::{
    Connection, ConnectionId, OutboundQueue, Registration, DEFAULT_QUEUE_CAPACITY,
};
pub use error::SyncError;
pub use freshness::{FreshnessFilter, DEFAULT_FRESHNESS_WINDOW};
pub use handler::{ws_router, WsState};
pub use hub::{FanOut, Hub, HubHandle, HubStats, DEFAULT_MAILBOX_CAPACITY};
pub use messages::{decode, encode, MessageKind, SyncMessage};
pub use policy::{PlaybackAction, PlaybackSession, SyncPolicy, VolumePolicy};
pub use presence::{PeerPresence, PresenceTracker};
