//! Sync message types and the JSON wire codec
//!
//! Clients and the hub exchange a single flat message shape:
//!
//! ```json
//! {"type": "play", "user_id": "u1", "song_id": "42", "position": 12.5, "volume": 0.8, "timestamp": 1700000000}
//! ```
//!
//! Only `type` is required on input. `timestamp` is always populated once a
//! message has been decoded.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SyncError;

/// Kind of playback state change
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Play,
    Pause,
    Seek,
    /// Older clients send `volume`
    #[serde(alias = "volume")]
    VolumeChange,
    /// Older clients send `playlist`
    #[serde(alias = "playlist")]
    PlaylistChange,
    Presence,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Play => "play",
            MessageKind::Pause => "pause",
            MessageKind::Seek => "seek",
            MessageKind::VolumeChange => "volume-change",
            MessageKind::PlaylistChange => "playlist-change",
            MessageKind::Presence => "presence",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A playback state-change event
///
/// Immutable once decoded. The hub serializes it once per broadcast and
/// hands the same frame to every recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Originating participant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Track identifier (playlist identifier for `playlist-change`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_id: Option<String>,

    /// Playback position in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,

    /// Volume level (0.0 - 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// Unix timestamp (seconds) when the event happened
    pub timestamp: i64,
}

/// Inbound shape before validation
#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    song_id: Option<String>,
    #[serde(default)]
    position: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl SyncMessage {
    /// Create a message of the given kind stamped with the current time
    pub fn new(kind: MessageKind) -> Self {
        Self {
            kind,
            user_id: None,
            song_id: None,
            position: None,
            volume: None,
            timestamp: current_timestamp(),
        }
    }

    /// Server-originated play event
    pub fn play(user_id: impl Into<String>, song_id: impl Into<String>, position: f64) -> Self {
        Self::new(MessageKind::Play)
            .with_user(user_id)
            .with_song(song_id)
            .with_position(position)
    }

    /// Server-originated pause event
    pub fn pause(user_id: impl Into<String>, position: f64) -> Self {
        Self::new(MessageKind::Pause)
            .with_user(user_id)
            .with_position(position)
    }

    pub fn seek(user_id: impl Into<String>, position: f64) -> Self {
        Self::new(MessageKind::Seek)
            .with_user(user_id)
            .with_position(position)
    }

    pub fn volume_change(user_id: impl Into<String>, volume: f64) -> Self {
        Self::new(MessageKind::VolumeChange)
            .with_user(user_id)
            .with_volume(volume)
    }

    /// `playlist_id` travels in `song_id`
    pub fn playlist_change(user_id: impl Into<String>, playlist_id: impl Into<String>) -> Self {
        Self::new(MessageKind::PlaylistChange)
            .with_user(user_id)
            .with_song(playlist_id)
    }

    pub fn presence(user_id: impl Into<String>) -> Self {
        Self::new(MessageKind::Presence).with_user(user_id)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_song(mut self, song_id: impl Into<String>) -> Self {
        self.song_id = Some(song_id.into());
        self
    }

    pub fn with_position(mut self, position: f64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether the fields this kind needs are present
    ///
    /// Incomplete messages still decode and still fan out; it is up to the
    /// consumer to ignore them.
    pub fn is_complete(&self) -> bool {
        match self.kind {
            MessageKind::Play | MessageKind::PlaylistChange => self.song_id.is_some(),
            MessageKind::Seek => self.position.is_some(),
            MessageKind::VolumeChange => self.volume.is_some(),
            MessageKind::Pause | MessageKind::Presence => true,
        }
    }
}

/// Current wall-clock time as unix seconds
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Decode a raw payload, stamping missing timestamps with the current time
pub fn decode(raw: &[u8]) -> Result<SyncMessage, SyncError> {
    decode_at(raw, current_timestamp())
}

/// Decode a raw payload using `now` for a missing timestamp
pub fn decode_at(raw: &[u8], now: i64) -> Result<SyncMessage, SyncError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| SyncError::MalformedPayload(e.to_string()))?;

    if !value.is_object() {
        return Err(SyncError::MalformedPayload(
            "expected a JSON object".to_string(),
        ));
    }

    let wire: WireMessage =
        serde_json::from_value(value).map_err(|e| SyncError::MalformedPayload(e.to_string()))?;

    if let Some(position) = wire.position {
        if !position.is_finite() || position < 0.0 {
            return Err(SyncError::MalformedPayload(format!(
                "position must be >= 0, got {}",
                position
            )));
        }
    }

    if let Some(volume) = wire.volume {
        if !(0.0..=1.0).contains(&volume) {
            return Err(SyncError::MalformedPayload(format!(
                "volume must be within 0.0..=1.0, got {}",
                volume
            )));
        }
    }

    let timestamp = match wire.timestamp {
        Some(ts) if ts > 0 => ts,
        _ => now,
    };

    Ok(SyncMessage {
        kind: wire.kind,
        user_id: wire.user_id,
        song_id: wire.song_id,
        position: wire.position,
        volume: wire.volume,
        timestamp,
    })
}

/// Encode a message into a JSON frame
pub fn encode(message: &SyncMessage) -> Result<Bytes, SyncError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    const NOW: i64 = 1_700_000_000;

    #[rstest]
    #[case("play", MessageKind::Play)]
    #[case("pause", MessageKind::Pause)]
    #[case("seek", MessageKind::Seek)]
    #[case("volume-change", MessageKind::VolumeChange)]
    #[case("playlist-change", MessageKind::PlaylistChange)]
    #[case("presence", MessageKind::Presence)]
    #[case("volume", MessageKind::VolumeChange)]
    #[case("playlist", MessageKind::PlaylistChange)]
    fn test_decode_kind(#[case] wire: &str, #[case] expected: MessageKind) {
        let raw = format!(r#"{{"type":"{}","timestamp":{}}}"#, wire, NOW);
        let msg = decode_at(raw.as_bytes(), NOW).unwrap();
        assert_eq!(msg.kind, expected);
    }

    #[test]
    fn test_legacy_kind_encodes_canonical_name() {
        let msg = decode_at(br#"{"type":"volume","volume":0.5}"#, NOW).unwrap();
        let json = String::from_utf8(encode(&msg).unwrap().to_vec()).unwrap();
        assert!(json.contains(r#""type":"volume-change""#));
    }

    #[test]
    fn test_decode_full_message() {
        let raw = br#"{"type":"play","user_id":"alice","song_id":"42","position":12.5,"volume":0.8,"timestamp":1699999999}"#;
        let msg = decode_at(raw, NOW).unwrap();

        assert_eq!(msg.kind, MessageKind::Play);
        assert_eq!(msg.user_id.as_deref(), Some("alice"));
        assert_eq!(msg.song_id.as_deref(), Some("42"));
        assert_eq!(msg.position, Some(12.5));
        assert_eq!(msg.volume, Some(0.8));
        assert_eq!(msg.timestamp, 1_699_999_999);
    }

    #[rstest]
    #[case(r#"{"type":"pause"}"#)]
    #[case(r#"{"type":"pause","timestamp":0}"#)]
    #[case(r#"{"type":"pause","timestamp":null}"#)]
    #[case(r#"{"type":"pause","timestamp":-5}"#)]
    fn test_missing_timestamp_is_stamped(#[case] raw: &str) {
        let msg = decode_at(raw.as_bytes(), NOW).unwrap();
        assert_eq!(msg.timestamp, NOW);
    }

    #[test]
    fn test_decode_uses_wall_clock() {
        let before = current_timestamp();
        let msg = decode(br#"{"type":"presence"}"#).unwrap();
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_missing_optionals_are_not_errors() {
        let msg = decode_at(br#"{"type":"volume-change"}"#, NOW).unwrap();
        assert_eq!(msg.volume, None);
        assert!(!msg.is_complete());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let msg = decode_at(br#"{"type":"seek","position":3,"extra":{"a":1}}"#, NOW).unwrap();
        assert_eq!(msg.position, Some(3.0));
    }

    #[rstest]
    #[case::not_json("play")]
    #[case::empty("")]
    #[case::array(r#"["play", "u1"]"#)]
    #[case::string(r#""play""#)]
    #[case::missing_type(r#"{"song_id":"42"}"#)]
    #[case::unknown_type(r#"{"type":"rewind"}"#)]
    #[case::wrong_case(r#"{"type":"PLAY"}"#)]
    #[case::position_as_string(r#"{"type":"seek","position":"12"}"#)]
    #[case::negative_position(r#"{"type":"seek","position":-1}"#)]
    #[case::volume_too_loud(r#"{"type":"volume-change","volume":1.5}"#)]
    #[case::negative_volume(r#"{"type":"volume-change","volume":-0.1}"#)]
    #[case::float_timestamp(r#"{"type":"pause","timestamp":1.5}"#)]
    fn test_decode_rejects_malformed(#[case] raw: &str) {
        assert_matches!(
            decode_at(raw.as_bytes(), NOW),
            Err(SyncError::MalformedPayload(_))
        );
    }

    #[test]
    fn test_volume_bounds_are_inclusive() {
        assert!(decode_at(br#"{"type":"volume-change","volume":0}"#, NOW).is_ok());
        assert!(decode_at(br#"{"type":"volume-change","volume":1}"#, NOW).is_ok());
    }

    #[test]
    fn test_round_trip_keeps_zero_valued_optionals() {
        let msg = SyncMessage::new(MessageKind::Play)
            .with_user("")
            .with_song("")
            .with_position(0.0)
            .with_volume(0.0)
            .with_timestamp(NOW);

        let decoded = decode_at(&encode(&msg).unwrap(), NOW + 100).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_round_trip_is_exact_for_arbitrary_floats() {
        // xorshift64 keeps the sequence deterministic
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next_unit = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 11) as f64 / (1u64 << 53) as f64
        };

        let mut cases = vec![(1823.3521453552403, 0.18233521453552403)];
        cases.extend((0..20_000).map(|_| {
            let volume = next_unit();
            (volume * 10_000.0, volume)
        }));

        for (position, volume) in cases {
            let msg = SyncMessage::new(MessageKind::Seek)
                .with_user("alice")
                .with_position(position)
                .with_volume(volume)
                .with_timestamp(NOW);

            let decoded = decode_at(&encode(&msg).unwrap(), NOW).unwrap();
            assert_eq!(decoded.position.map(f64::to_bits), Some(position.to_bits()));
            assert_eq!(decoded.volume.map(f64::to_bits), Some(volume.to_bits()));
        }
    }

    #[test]
    fn test_round_trip_keeps_absent_optionals_absent() {
        let msg = decode_at(br#"{"type":"presence","user_id":"bob"}"#, NOW).unwrap();
        let json = String::from_utf8(encode(&msg).unwrap().to_vec()).unwrap();

        assert!(!json.contains("song_id"));
        assert!(!json.contains("position"));
        assert_eq!(decode_at(json.as_bytes(), NOW + 100).unwrap(), msg);
    }

    #[test]
    fn test_server_originated_constructors() {
        let play = SyncMessage::play("alice", "42", 0.0);
        assert_eq!(play.kind, MessageKind::Play);
        assert_eq!(play.song_id.as_deref(), Some("42"));
        assert!(play.timestamp > 0);
        assert!(play.is_complete());

        let pause = SyncMessage::pause("alice", 31.0);
        assert_eq!(pause.kind, MessageKind::Pause);
        assert_eq!(pause.position, Some(31.0));
        assert!(pause.song_id.is_none());

        assert!(SyncMessage::seek("alice", 12.5).is_complete());
        assert_eq!(SyncMessage::volume_change("alice", 0.4).volume, Some(0.4));

        let playlist = SyncMessage::playlist_change("alice", "mix");
        assert_eq!(playlist.kind, MessageKind::PlaylistChange);
        assert_eq!(playlist.song_id.as_deref(), Some("mix"));

        let presence = SyncMessage::presence("alice");
        assert_eq!(presence.user_id.as_deref(), Some("alice"));
        assert!(presence.position.is_none());
    }

    #[rstest]
    #[case(SyncMessage::new(MessageKind::Play), false)]
    #[case(SyncMessage::new(MessageKind::Play).with_song("1"), true)]
    #[case(SyncMessage::new(MessageKind::Seek), false)]
    #[case(SyncMessage::new(MessageKind::Seek).with_position(1.0), true)]
    #[case(SyncMessage::new(MessageKind::PlaylistChange), false)]
    #[case(SyncMessage::new(MessageKind::PlaylistChange).with_song("mix"), true)]
    #[case(SyncMessage::new(MessageKind::Pause), true)]
    #[case(SyncMessage::new(MessageKind::Presence), true)]
    fn test_is_complete(#[case] msg: SyncMessage, #[case] complete: bool) {
        assert_eq!(msg.is_complete(), complete);
    }
}
