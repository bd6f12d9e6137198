//! Participant connections and their outbound queues
//!
//! A [`Connection`] is the hub's view of one participant: an identity and
//! the sending half of a bounded outbound queue. The transport keeps the
//! matching [`OutboundQueue`] and drains it into the socket.
//!
//! The hub is the only owner of a registered `Connection`. Dropping it
//! closes the queue, which lets the write path flush what is pending,
//! send a close frame and finish.

use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::error::SyncError;

/// Default number of frames a connection may have pending
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One encoded message on its way to a socket
pub type Frame = Bytes;

/// Identity of a single connection object
///
/// Two tabs of the same participant get two different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hub-side handle for one participant
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    participant_id: String,
    sender: mpsc::Sender<Frame>,
    capacity: usize,
    alive: Arc<AtomicBool>,
    /// When this connection was created (Unix timestamp ms)
    connected_at: i64,
}

impl Connection {
    /// Create a connection and the queue its write path drains
    ///
    /// A capacity of zero is treated as one.
    pub fn new(participant_id: impl Into<String>, capacity: usize) -> (Self, OutboundQueue) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let alive = Arc::new(AtomicBool::new(true));
        let id = ConnectionId::new();

        let connection = Self {
            id,
            participant_id: participant_id.into(),
            sender,
            capacity,
            alive: alive.clone(),
            connected_at: chrono::Utc::now().timestamp_millis(),
        };
        let queue = OutboundQueue {
            id,
            receiver,
            alive,
        };

        (connection, queue)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn connected_at(&self) -> i64 {
        self.connected_at
    }

    /// Frames queued but not yet taken by the write path
    pub fn pending(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    /// Non-blocking insert; `false` means the hub should drop this connection
    pub fn enqueue(&self, frame: Frame) -> bool {
        self.try_enqueue(frame).is_ok()
    }

    /// Non-blocking insert reporting why it failed
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), SyncError> {
        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SyncError::SlowConsumer,
            mpsc::error::TrySendError::Closed(_) => {
                SyncError::TransportFailure("outbound queue closed".to_string())
            }
        })
    }

    /// Still registered and the write path is still draining
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.sender.is_closed()
    }

    /// Close the outbound queue
    ///
    /// Frames already queued are still delivered before the write path
    /// sees the end of the queue.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}

/// Transport-side end of a connection's outbound queue
#[derive(Debug)]
pub struct OutboundQueue {
    id: ConnectionId,
    receiver: mpsc::Receiver<Frame>,
    alive: Arc<AtomicBool>,
}

impl OutboundQueue {
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Next frame; `None` once the hub closed the queue and it is drained
    pub async fn recv(&mut self) -> Option<Frame> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// Whether the hub still holds this connection
    pub fn is_registered(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Registration flag for the read path, which does not own the queue
    pub fn registration(&self) -> Registration {
        Registration {
            alive: self.alive.clone(),
        }
    }
}

/// Read-only view of whether the hub still holds a connection
#[derive(Debug, Clone)]
pub struct Registration {
    alive: Arc<AtomicBool>,
}

impl Registration {
    pub fn is_registered(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
