use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::UserId;
use super::permission::Role;
use super::user::UserProfile;

/// Presence status of a connected user (independent of role)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Away,
    Busy,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
            Self::Offline => "offline",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

impl FromStr for PresenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "busy" => Ok(Self::Busy),
            "offline" => Ok(Self::Offline),
            _ => Err(format!("Unknown presence status: {s}")),
        }
    }
}

impl std::fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user participating in a session.
///
/// The role is assigned at join time and stays fixed unless the
/// participant is explicitly promoted by a moderator. `last_seen`
/// never moves backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub status: PresenceStatus,
    pub joined_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Participant {
    pub fn new(profile: &UserProfile, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user_id: profile.user_id.clone(),
            display_name: profile.display_name.clone(),
            role,
            status: PresenceStatus::Online,
            joined_at: now,
            last_seen: now,
        }
    }

    /// Record activity. `last_seen` is monotonically non-decreasing.
    pub fn touch(&mut self) {
        let now = Utc::now();
        if now > self.last_seen {
            self.last_seen = now;
        }
    }

    /// Explicit role change by a moderator
    pub fn promote(&mut self, role: Role) {
        self.role = role;
    }
}
