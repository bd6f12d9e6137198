//! Freshness filter applied to every message before fan-out
//!
//! Peers resolve conflicting claims by wall-clock timestamp, so a message
//! delayed past the window could drag everyone back to an old position.
//! Late messages are dropped instead of forwarded.

use std::time::Duration;

use super::error::SyncError;
use super::messages::{current_timestamp, SyncMessage};

/// Maximum age a message may have and still be forwarded
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessFilter {
    window: Duration,
}

impl FreshnessFilter {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Check a message against `now` (unix seconds)
    ///
    /// Timestamps ahead of `now` are accepted; small clock skew between
    /// devices is expected.
    pub fn check(&self, message: &SyncMessage, now: i64) -> Result<(), SyncError> {
        let window_secs = self.window.as_secs();
        let age_secs = now.saturating_sub(message.timestamp);

        if age_secs > i64::try_from(window_secs).unwrap_or(i64::MAX) {
            return Err(SyncError::StaleMessage {
                age_secs,
                window_secs,
            });
        }
        Ok(())
    }

    pub fn accept(&self, message: &SyncMessage, now: i64) -> bool {
        self.check(message, now).is_ok()
    }

    pub fn accept_now(&self, message: &SyncMessage) -> bool {
        self.accept(message, current_timestamp())
    }
}

impl Default for FreshnessFilter {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS_WINDOW)
    }
}
