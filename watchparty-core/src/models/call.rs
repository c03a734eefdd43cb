use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::id::{generate_id, SessionId, UserId};

/// A voice-call sub-session inside a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceCall {
    pub id: String, // nanoid(12)
    pub session_id: SessionId,
    pub started_by: UserId,
    pub participants: HashSet<UserId>,
    pub started_at: DateTime<Utc>,
    pub active: bool,
}

impl VoiceCall {
    pub fn new(session_id: SessionId, started_by: UserId, participants: HashSet<UserId>) -> Self {
        Self {
            id: generate_id(),
            session_id,
            started_by,
            participants,
            started_at: Utc::now(),
            active: true,
        }
    }

    /// Remove a participant. Returns true if the call is now empty.
    pub fn remove_participant(&mut self, user_id: &UserId) -> bool {
        self.participants.remove(user_id);
        self.participants.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ShareQuality {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ShareConfig {
    pub with_audio: bool,
    pub quality: ShareQuality,
}

/// A screen-share sub-session. At most one active share per sharer per
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenShare {
    pub id: String, // nanoid(12)
    pub session_id: SessionId,
    pub sharer_id: UserId,
    pub config: ShareConfig,
    pub started_at: DateTime<Utc>,
    pub active: bool,
}

impl ScreenShare {
    pub fn new(session_id: SessionId, sharer_id: UserId, config: ShareConfig) -> Self {
        Self {
            id: generate_id(),
            session_id,
            sharer_id,
            config,
            started_at: Utc::now(),
            active: true,
        }
    }
}
