//! Participant presence tracking
//!
//! Built from `presence` messages on the consumer side. The hub only
//! relays them; a peer decides from here who is still around.

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;

use super::messages::{MessageKind, SyncMessage};

/// Last known presence of one participant
#[derive(Debug, Clone, PartialEq)]
pub struct PeerPresence {
    pub user_id: String,
    /// Track the peer last reported, if any
    pub current_track: Option<String>,
    pub last_seen: DateTime<Utc>,
}

impl PeerPresence {
    /// Check if the peer is stale (no activity for given duration)
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.last_seen > max_age
    }
}

/// Presence map keyed by participant id
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    peers: HashMap<String, PeerPresence>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity from a message
    ///
    /// Any message with a `user_id` proves that participant is alive; play
    /// and presence messages also update the reported track. Older messages
    /// never move `last_seen` backwards.
    pub fn observe(&mut self, message: &SyncMessage) {
        let Some(user_id) = message.user_id.as_deref() else {
            return;
        };
        let Some(seen) = Utc.timestamp_opt(message.timestamp, 0).single() else {
            return;
        };

        let entry = self
            .peers
            .entry(user_id.to_string())
            .or_insert_with(|| PeerPresence {
                user_id: user_id.to_string(),
                current_track: None,
                last_seen: seen,
            });

        if seen >= entry.last_seen {
            entry.last_seen = seen;
            if matches!(message.kind, MessageKind::Play | MessageKind::Presence)
                && message.song_id.is_some()
            {
                entry.current_track = message.song_id.clone();
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<&PeerPresence> {
        self.peers.get(user_id)
    }

    /// Peers seen within `max_age`, sorted by id
    pub fn online(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> Vec<&PeerPresence> {
        let mut online: Vec<_> = self
            .peers
            .values()
            .filter(|p| !p.is_stale(now, max_age))
            .collect();
        online.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        online
    }

    /// Forget peers not seen within `max_age`; returns how many were removed
    pub fn prune(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) -> usize {
        let before = self.peers.len();
        self.peers.retain(|_, p| !p.is_stale(now, max_age));
        before - self.peers.len()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
