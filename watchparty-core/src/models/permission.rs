//! Permission system for collaborative sessions.
//!
//! A 64-bit permission bitmask with role presets. The role -> permission
//! mapping is data, not code branching, so individual sessions can override
//! it via the Allow/Deny pattern without touching the engine.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 64-bit permission bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionBits(pub u64);

impl PermissionBits {
    // ===== Content Permissions (0-9) =====

    /// Send chat messages
    pub const SEND_CHAT: u64 = 1 << 0;

    /// Create timestamped annotations
    pub const ANNOTATE: u64 = 1 << 1;

    /// Join and start voice calls
    pub const VOICE_CALL: u64 = 1 << 2;

    /// Start a screen share
    pub const SCREEN_SHARE: u64 = 1 << 3;

    // ===== Playback Permissions (10-19) =====

    /// Playback control (play/pause/seek/speed)
    pub const PLAYBACK_CONTROL: u64 = 1 << 10;

    /// Create and edit shared playlists
    pub const MANAGE_PLAYLIST: u64 = 1 << 11;

    // ===== Member Management Permissions (20-29) =====

    /// Moderate the session (promote members, general moderation)
    pub const MODERATE: u64 = 1 << 20;

    /// Invite users to a private session
    pub const INVITE_USER: u64 = 1 << 21;

    /// Kick a participant
    pub const KICK_MEMBER: u64 = 1 << 22;

    /// Ban/unban a participant
    pub const BAN_MEMBER: u64 = 1 << 23;

    // ===== Permission Combinations =====

    /// All permissions (for the session host)
    pub const ALL: u64 = u64::MAX;

    /// Default participant permissions
    pub const DEFAULT_PARTICIPANT: u64 = Self::SEND_CHAT | Self::ANNOTATE | Self::VOICE_CALL;

    /// Default guest permissions (same as participant)
    pub const DEFAULT_GUEST: u64 = Self::DEFAULT_PARTICIPANT;

    /// Default moderator permissions
    pub const DEFAULT_MODERATOR: u64 = Self::DEFAULT_PARTICIPANT
        | Self::PLAYBACK_CONTROL
        | Self::MANAGE_PLAYLIST
        | Self::MODERATE;

    pub const NONE: u64 = 0;

    #[must_use]
    pub const fn new(bits: u64) -> Self {
        Self(bits)
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self(Self::NONE)
    }

    /// Check if has specific permission
    #[must_use]
    pub const fn has(&self, permission: u64) -> bool {
        (self.0 & permission) != 0
    }

    /// Check if has all specified permissions
    #[must_use]
    pub const fn has_all(&self, permissions: u64) -> bool {
        (self.0 & permissions) == permissions
    }

    /// Add permission (Allow pattern)
    pub const fn grant(&mut self, permission: u64) {
        self.0 |= permission;
    }

    /// Remove permission (Deny pattern)
    pub const fn revoke(&mut self, permission: u64) {
        self.0 &= !permission;
    }

    /// Set permission state
    pub const fn set(&mut self, permission: u64, enabled: bool) {
        if enabled {
            self.grant(permission);
        } else {
            self.revoke(permission);
        }
    }
}

impl Default for PermissionBits {
    fn default() -> Self {
        Self::empty()
    }
}

/// Participant role inside a session.
///
/// Roles determine base permissions; sessions can layer Allow/Deny
/// overrides on top via [`PermissionOverrides`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Session host - has all permissions (fixed, cannot be modified)
    Host,
    /// Moderator - playback control, playlist management and moderation
    Moderator,
    /// Regular participant
    Participant,
    /// Guest
    Guest,
}

impl Role {
    /// Get base permissions for this role (before session overrides)
    #[must_use]
    pub const fn permissions(&self) -> PermissionBits {
        match self {
            Self::Host => PermissionBits(PermissionBits::ALL),
            Self::Moderator => PermissionBits(PermissionBits::DEFAULT_MODERATOR),
            Self::Participant => PermissionBits(PermissionBits::DEFAULT_PARTICIPANT),
            Self::Guest => PermissionBits(PermissionBits::DEFAULT_GUEST),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "moderator" => Ok(Self::Moderator),
            "participant" => Ok(Self::Participant),
            "guest" => Ok(Self::Guest),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Moderator => write!(f, "moderator"),
            Self::Participant => write!(f, "participant"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

/// Per-session Allow/Deny overrides of the role defaults.
///
/// Formula: `effective = (role_default | added) & !removed`. The host
/// role is fixed and cannot be overridden.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionOverrides {
    pub moderator_added: Option<u64>,
    pub moderator_removed: Option<u64>,
    pub participant_added: Option<u64>,
    pub participant_removed: Option<u64>,
    pub guest_added: Option<u64>,
    pub guest_removed: Option<u64>,
}

impl PermissionOverrides {
    /// Apply Allow/Deny modifications to a role default
    #[must_use]
    pub fn effective(
        role_default: PermissionBits,
        added: Option<u64>,
        removed: Option<u64>,
    ) -> PermissionBits {
        let mut result = role_default.0;

        if let Some(added) = added {
            result |= added;
        }
        if let Some(removed) = removed {
            result &= !removed;
        }

        PermissionBits(result)
    }

    /// Effective permissions for a role in the owning session
    #[must_use]
    pub fn for_role(&self, role: Role) -> PermissionBits {
        match role {
            Role::Host => PermissionBits(PermissionBits::ALL),
            Role::Moderator => Self::effective(
                Role::Moderator.permissions(),
                self.moderator_added,
                self.moderator_removed,
            ),
            Role::Participant => Self::effective(
                Role::Participant.permissions(),
                self.participant_added,
                self.participant_removed,
            ),
            Role::Guest => Self::effective(
                Role::Guest.permissions(),
                self.guest_added,
                self.guest_removed,
            ),
        }
    }
}
