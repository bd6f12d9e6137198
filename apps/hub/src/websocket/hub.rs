//! The hub: connection registry and broadcast authority
//!
//! The registry is a plain `HashMap` owned by the [`Hub`] value. Once
//! [`Hub::spawn`] moves it into its task, the only way to reach it is the
//! [`HubHandle`] mailbox, so every registration, removal and fan-out
//! happens on one task in arrival order. No lock guards the registry.
//!
//! Fan-out never awaits a peer: each recipient gets a non-blocking
//! `enqueue`, and a recipient whose queue is full is evicted on the spot.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::{mpsc, oneshot};

use super::connection::{Connection, ConnectionId};
use super::error::SyncError;
use super::freshness::FreshnessFilter;
use super::messages::{current_timestamp, encode, SyncMessage};

/// Default number of commands that may wait for the hub loop
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

/// Outcome of one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanOut {
    /// Passed the freshness filter
    pub accepted: bool,
    /// Recipients whose queue took the frame
    pub delivered: usize,
    /// Recipients dropped because their queue was full or closed
    pub evicted: usize,
}

/// Snapshot of hub counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Registered connections
    pub connections: usize,
    /// Distinct participant ids among them
    pub participants: usize,
    /// Broadcasts processed since start
    pub broadcasts: u64,
    /// Broadcasts dropped by the freshness filter
    pub dropped_stale: u64,
    /// Connections evicted as slow consumers
    pub evicted: u64,
}

enum HubCommand {
    Register(Connection),
    Unregister(ConnectionId),
    Broadcast {
        message: SyncMessage,
        sender: Option<ConnectionId>,
        reply: Option<oneshot::Sender<FanOut>>,
    },
    Stats(oneshot::Sender<HubStats>),
    Shutdown,
}

/// Registry of live connections
#[derive(Debug, Default)]
pub struct Hub {
    connections: HashMap<ConnectionId, Connection>,
    filter: FreshnessFilter,
    broadcasts: u64,
    dropped_stale: u64,
    evicted: u64,
}

impl Hub {
    pub fn new(filter: FreshnessFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Move the hub onto its own task and return the handle that feeds it
    pub fn spawn(self, mailbox_capacity: usize) -> HubHandle {
        let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
        tokio::spawn(self.run(rx));
        HubHandle { tx }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Add a connection to the active set
    pub fn register(&mut self, connection: Connection) {
        let id = connection.id();
        tracing::debug!(
            connection_id = %id,
            participant_id = %connection.participant_id(),
            connections = self.connections.len() + 1,
            "Connection registered"
        );
        self.connections.insert(id, connection);
    }

    /// Remove a connection and close its queue
    ///
    /// Removing an absent connection is a no-op and returns `false`.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some(connection) => {
                tracing::debug!(
                    connection_id = %id,
                    participant_id = %connection.participant_id(),
                    connected_at = connection.connected_at(),
                    connections = self.connections.len(),
                    "Connection unregistered"
                );
                connection.close();
                true
            }
            None => false,
        }
    }

    /// Deliver `message` to every registered connection except `sender`
    ///
    /// `now` is the hub's processing time in unix seconds.
    pub fn fan_out(
        &mut self,
        message: &SyncMessage,
        sender: Option<ConnectionId>,
        now: i64,
    ) -> FanOut {
        if let Some(id) = sender {
            if !self.connections.contains_key(&id) {
                tracing::debug!(
                    connection_id = %id,
                    kind = %message.kind,
                    "Dropping message from unregistered connection"
                );
                return FanOut::default();
            }
        }

        self.broadcasts += 1;

        if let Err(e) = self.filter.check(message, now) {
            self.dropped_stale += 1;
            tracing::debug!(
                kind = %message.kind,
                user_id = message.user_id.as_deref().unwrap_or(""),
                error = %e,
                "Dropping stale message"
            );
            return FanOut::default();
        }

        let frame = match encode(message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, kind = %message.kind, "Failed to encode message");
                return FanOut::default();
            }
        };

        let mut outcome = FanOut {
            accepted: true,
            ..Default::default()
        };
        let mut failed = Vec::new();

        for (id, connection) in &self.connections {
            if Some(*id) == sender {
                continue;
            }
            match connection.try_enqueue(frame.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(e) => failed.push((*id, e)),
            }
        }

        for (id, reason) in failed {
            if let Some(connection) = self.connections.remove(&id) {
                tracing::warn!(
                    connection_id = %id,
                    participant_id = %connection.participant_id(),
                    pending = connection.pending(),
                    error = %reason,
                    "Evicting connection"
                );
                connection.close();
                outcome.evicted += 1;
                self.evicted += 1;
            }
        }

        tracing::trace!(
            kind = %message.kind,
            delivered = outcome.delivered,
            evicted = outcome.evicted,
            "Broadcast fanned out"
        );

        outcome
    }

    pub fn stats(&self) -> HubStats {
        let participants: HashSet<&str> = self
            .connections
            .values()
            .map(|c| c.participant_id())
            .collect();

        HubStats {
            connections: self.connections.len(),
            participants: participants.len(),
            broadcasts: self.broadcasts,
            dropped_stale: self.dropped_stale,
            evicted: self.evicted,
        }
    }

    /// Close every queue and empty the registry
    pub fn close_all(&mut self) {
        let count = self.connections.len();
        for (_, connection) in self.connections.drain() {
            connection.close();
        }
        if count > 0 {
            tracing::info!(connections = count, "Closed all connections");
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        tracing::info!(
            freshness_window_secs = self.filter.window().as_secs(),
            "Hub started"
        );

        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register(connection) => self.register(connection),
                HubCommand::Unregister(id) => {
                    self.unregister(id);
                }
                HubCommand::Broadcast {
                    message,
                    sender,
                    reply,
                } => {
                    let outcome = self.fan_out(&message, sender, current_timestamp());
                    if let Some(reply) = reply {
                        let _ = reply.send(outcome);
                    }
                }
                HubCommand::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
                HubCommand::Shutdown => {
                    tracing::info!("Hub shutdown requested");
                    break;
                }
            }
        }

        // Refuse further commands before the queues close
        drop(commands);
        self.close_all();
        tracing::info!("Hub stopped");
    }
}

/// Cloneable entry point into a running hub
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubCommand::Register(c) => f.debug_tuple("Register").field(&c.id()).finish(),
            HubCommand::Unregister(id) => f.debug_tuple("Unregister").field(id).finish(),
            HubCommand::Broadcast { message, .. } => {
                f.debug_tuple("Broadcast").field(&message.kind).finish()
            }
            HubCommand::Stats(_) => f.write_str("Stats"),
            HubCommand::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> Result<(), SyncError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| SyncError::HubUnavailable)
    }

    pub async fn register(&self, connection: Connection) -> Result<(), SyncError> {
        self.send(HubCommand::Register(connection)).await
    }

    pub async fn unregister(&self, id: ConnectionId) -> Result<(), SyncError> {
        self.send(HubCommand::Unregister(id)).await
    }

    /// Relay a message from a connected participant to everyone else
    pub async fn broadcast(
        &self,
        message: SyncMessage,
        sender: ConnectionId,
    ) -> Result<(), SyncError> {
        self.send(HubCommand::Broadcast {
            message,
            sender: Some(sender),
            reply: None,
        })
        .await
    }

    /// Send a server-originated message to every connection and wait for
    /// the outcome
    pub async fn publish(&self, message: SyncMessage) -> Result<FanOut, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Broadcast {
            message,
            sender: None,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| SyncError::HubUnavailable)
    }

    pub async fn stats(&self) -> Result<HubStats, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| SyncError::HubUnavailable)
    }

    /// Stop the hub loop and close every connection's queue
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.send(HubCommand::Shutdown).await
    }

    /// Whether the hub loop has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
