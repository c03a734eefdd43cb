use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authoritative playback state of a session.
///
/// Updates replace the whole state, never individual fields, to
/// preserve the last-writer-wins contract. `synced_at` strictly
/// increases across accepted updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub is_playing: bool,
    /// Playback position in seconds
    pub position: f64,
    /// Playback rate (0.5, 1.0, 1.5, 2.0, ...)
    pub speed: f64,
    /// Opaque reference to the content being watched
    pub content: Option<String>,
    pub volume: f64,
    pub muted: bool,
    /// Coordinator-assigned timestamp of the last accepted sync
    pub synced_at: DateTime<Utc>,
}

impl PlaybackState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            is_playing: false,
            position: 0.0,
            speed: 1.0,
            content: None,
            volume: 1.0,
            muted: false,
            synced_at: Utc::now(),
        }
    }

    /// Stamp this snapshot with a coordinator timestamp
    #[must_use]
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.synced_at = at;
        self
    }

    /// Coarse state derived from the playing flag and position
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        if self.is_playing {
            SyncState::Playing
        } else if self.position == 0.0 {
            SyncState::Stopped
        } else {
            SyncState::Paused
        }
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Stopped,
    Playing,
    Paused,
}
