//! Consumer-side interpretation of broadcast messages
//!
//! The hub never applies these rules itself; it only relays. They live
//! here so Rust clients (and the tests) share one definition of what a
//! peer should do when a message arrives.

use serde::{Deserialize, Serialize};

use super::messages::{MessageKind, SyncMessage};

/// A `play` this close to the local position of the same track is jitter
pub const SEEK_TOLERANCE_SECS: f64 = 1.0;

/// Whether peers follow each other's volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumePolicy {
    Apply,
    /// Volume stays a local preference
    #[default]
    Ignore,
}

impl std::str::FromStr for VolumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "apply" | "sync" => Ok(Self::Apply),
            "ignore" | "local" => Ok(Self::Ignore),
            other => Err(format!("unknown volume policy '{}'", other)),
        }
    }
}

/// What a peer should do in response to a message
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackAction {
    Play { track_id: String, position: f64 },
    Pause { position: Option<f64> },
    Seek { position: f64 },
    SetVolume(f64),
    ReloadPlaylist(String),
}

/// A peer's local view of playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    pub track_id: Option<String>,
    /// Position in seconds
    pub position: f64,
    pub is_playing: bool,
    pub volume: f64,
    pub playlist_id: Option<String>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            track_id: None,
            position: 0.0,
            is_playing: false,
            volume: 1.0,
            playlist_id: None,
        }
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an action to the local state
    pub fn apply(&mut self, action: &PlaybackAction) {
        match action {
            PlaybackAction::Play { track_id, position } => {
                self.track_id = Some(track_id.clone());
                self.position = *position;
                self.is_playing = true;
            }
            PlaybackAction::Pause { position } => {
                if let Some(position) = position {
                    self.position = *position;
                }
                self.is_playing = false;
            }
            PlaybackAction::Seek { position } => self.position = *position,
            PlaybackAction::SetVolume(volume) => self.volume = *volume,
            PlaybackAction::ReloadPlaylist(playlist_id) => {
                self.playlist_id = Some(playlist_id.clone());
            }
        }
    }

    fn is_playing_near(&self, track_id: &str, position: f64) -> bool {
        self.is_playing
            && self.track_id.as_deref() == Some(track_id)
            && (self.position - position).abs() <= SEEK_TOLERANCE_SECS
    }
}

/// Maps incoming messages to local actions
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncPolicy {
    pub volume: VolumePolicy,
}

impl SyncPolicy {
    pub fn new(volume: VolumePolicy) -> Self {
        Self { volume }
    }

    /// Decide what `session` should do about `message`
    ///
    /// Returns `None` for presence, incomplete messages and redundant plays.
    pub fn interpret(
        &self,
        session: &PlaybackSession,
        message: &SyncMessage,
    ) -> Option<PlaybackAction> {
        if !message.is_complete() {
            return None;
        }

        match message.kind {
            MessageKind::Play => {
                let track_id = message.song_id.clone()?;
                let position = message.position.unwrap_or(0.0);
                if session.is_playing_near(&track_id, position) {
                    return None;
                }
                Some(PlaybackAction::Play { track_id, position })
            }
            MessageKind::Pause => Some(PlaybackAction::Pause {
                position: message.position,
            }),
            MessageKind::Seek => message
                .position
                .map(|position| PlaybackAction::Seek { position }),
            MessageKind::VolumeChange => match self.volume {
                VolumePolicy::Apply => message.volume.map(PlaybackAction::SetVolume),
                VolumePolicy::Ignore => None,
            },
            MessageKind::PlaylistChange => {
                message.song_id.clone().map(PlaybackAction::ReloadPlaylist)
            }
            MessageKind::Presence => None,
        }
    }

    /// Interpret and apply in one step, returning what was applied
    pub fn follow(
        &self,
        session: &mut PlaybackSession,
        message: &SyncMessage,
    ) -> Option<PlaybackAction> {
        let action = self.interpret(session, message)?;
        session.apply(&action);
        Some(action)
    }
}
