use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::id::{SessionId, UserId};
use super::participant::Participant;
use super::permission::{PermissionBits, PermissionOverrides, Role};
use super::playback::PlaybackState;
use super::user::UserProfile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

impl Visibility {
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private)
    }
}

/// Configuration for creating a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub name: String,
    #[serde(default)]
    pub visibility: Visibility,
    /// Plaintext password; hashed before storage
    pub password: Option<String>,
    pub max_participants: usize,
    #[serde(default)]
    pub overrides: PermissionOverrides,
}

impl SessionConfig {
    #[must_use]
    pub fn new(name: impl Into<String>, max_participants: usize) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            password: None,
            max_participants,
            overrides: PermissionOverrides::default(),
        }
    }
}

/// An active collaborative session.
///
/// The session exclusively owns its playback state and participant
/// membership. Invariants: participant count never exceeds
/// `max_participants`, and banned users can never be members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub host_id: UserId,
    pub name: String,
    pub visibility: Visibility,
    pub password_hash: Option<String>,
    pub max_participants: usize,
    pub overrides: PermissionOverrides,
    pub playback: PlaybackState,
    pub participants: HashMap<UserId, Participant>,
    pub invited: HashSet<UserId>,
    pub banned: HashSet<UserId>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        host: &UserProfile,
        name: String,
        visibility: Visibility,
        password_hash: Option<String>,
        max_participants: usize,
        overrides: PermissionOverrides,
    ) -> Self {
        let mut participants = HashMap::new();
        participants.insert(host.user_id.clone(), Participant::new(host, Role::Host));

        Self {
            id: SessionId::new(),
            host_id: host.user_id.clone(),
            name,
            visibility,
            password_hash,
            max_participants,
            overrides,
            playback: PlaybackState::new(),
            participants,
            invited: HashSet::new(),
            banned: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    #[must_use]
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.participants.contains_key(user_id)
    }

    #[must_use]
    pub fn is_banned(&self, user_id: &UserId) -> bool {
        self.banned.contains(user_id)
    }

    /// The host is implicitly invited to their own private session
    #[must_use]
    pub fn is_invited(&self, user_id: &UserId) -> bool {
        *user_id == self.host_id || self.invited.contains(user_id)
    }

    #[must_use]
    pub fn participant(&self, user_id: &UserId) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    /// Effective permissions of a member, resolved against current
    /// membership and the session's overrides. None if not a member.
    #[must_use]
    pub fn permissions_for(&self, user_id: &UserId) -> Option<PermissionBits> {
        self.participants
            .get(user_id)
            .map(|p| self.overrides.for_role(p.role))
    }

    #[must_use]
    pub fn has_permission(&self, user_id: &UserId, permission: u64) -> bool {
        self.permissions_for(user_id)
            .is_some_and(|bits| bits.has(permission))
    }

    #[must_use]
    pub fn participant_list(&self) -> Vec<Participant> {
        self.participants.values().cloned().collect()
    }
}
