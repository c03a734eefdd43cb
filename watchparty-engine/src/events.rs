use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use watchparty_core::models::{
    Annotation, AnnotationReply, ChatMessage, Participant, PlaybackState, PlaylistId,
    PlaylistVideo, ScreenShare, SessionId, SharedPlaylist, UserId, VoiceCall,
};

/// Events broadcast to session participants through the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A session was created
    SessionCreated {
        session_id: SessionId,
        host_id: UserId,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Full state snapshot, sent to a newly joined participant before
    /// any subsequent broadcast so it never observes an event
    /// referencing state it has not received
    StateSnapshot {
        session_id: SessionId,
        playback: PlaybackState,
        participants: Vec<Participant>,
        chat_history: Vec<ChatMessage>,
        annotations: Vec<Annotation>,
        timestamp: DateTime<Utc>,
    },

    /// A user joined the session
    UserJoined {
        session_id: SessionId,
        participant: Participant,
        timestamp: DateTime<Utc>,
    },

    /// A user left the session (or was evicted/banned)
    UserLeft {
        session_id: SessionId,
        user_id: UserId,
        display_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Authoritative playback state replaced (last-writer-wins)
    PlaybackSynced {
        session_id: SessionId,
        user_id: UserId,
        state: PlaybackState,
        /// Advisory only; clients decide whether to apply a local
        /// correction within this window
        sync_tolerance_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Chat message appended to the session log
    ChatMessageReceived {
        session_id: SessionId,
        message: ChatMessage,
        timestamp: DateTime<Utc>,
    },

    /// Reaction added to an existing chat message
    MessageReactionAdded {
        session_id: SessionId,
        message_id: String,
        user_id: UserId,
        emoji: String,
        timestamp: DateTime<Utc>,
    },

    /// Timestamped annotation created
    AnnotationCreated {
        session_id: SessionId,
        annotation: Annotation,
        timestamp: DateTime<Utc>,
    },

    /// Reply appended to an annotation
    AnnotationReplyAdded {
        session_id: SessionId,
        annotation_id: String,
        reply: AnnotationReply,
        timestamp: DateTime<Utc>,
    },

    /// Voice call started
    VoiceCallStarted {
        session_id: SessionId,
        call: VoiceCall,
        timestamp: DateTime<Utc>,
    },

    /// Voice call ended (last participant left or explicit end)
    VoiceCallEnded {
        session_id: SessionId,
        call_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Screen share started
    ScreenShareStarted {
        session_id: SessionId,
        share: ScreenShare,
        timestamp: DateTime<Utc>,
    },

    /// Screen share stopped
    ScreenShareStopped {
        session_id: SessionId,
        share_id: String,
        sharer_id: UserId,
        timestamp: DateTime<Utc>,
    },

    /// Shared playlist created
    PlaylistCreated {
        session_id: SessionId,
        playlist: SharedPlaylist,
        timestamp: DateTime<Utc>,
    },

    /// Video appended to a shared playlist
    VideoAddedToPlaylist {
        session_id: SessionId,
        playlist_id: PlaylistId,
        video: PlaylistVideo,
        added_by: UserId,
        timestamp: DateTime<Utc>,
    },

    /// Periodic liveness ping
    Heartbeat {
        session_id: SessionId,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// The session this event belongs to
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionCreated { session_id, .. }
            | Self::StateSnapshot { session_id, .. }
            | Self::UserJoined { session_id, .. }
            | Self::UserLeft { session_id, .. }
            | Self::PlaybackSynced { session_id, .. }
            | Self::ChatMessageReceived { session_id, .. }
            | Self::MessageReactionAdded { session_id, .. }
            | Self::AnnotationCreated { session_id, .. }
            | Self::AnnotationReplyAdded { session_id, .. }
            | Self::VoiceCallStarted { session_id, .. }
            | Self::VoiceCallEnded { session_id, .. }
            | Self::ScreenShareStarted { session_id, .. }
            | Self::ScreenShareStopped { session_id, .. }
            | Self::PlaylistCreated { session_id, .. }
            | Self::VideoAddedToPlaylist { session_id, .. }
            | Self::Heartbeat { session_id, .. } => session_id,
        }
    }

    /// Get the timestamp of this event
    #[must_use]
    pub const fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::SessionCreated { timestamp, .. }
            | Self::StateSnapshot { timestamp, .. }
            | Self::UserJoined { timestamp, .. }
            | Self::UserLeft { timestamp, .. }
            | Self::PlaybackSynced { timestamp, .. }
            | Self::ChatMessageReceived { timestamp, .. }
            | Self::MessageReactionAdded { timestamp, .. }
            | Self::AnnotationCreated { timestamp, .. }
            | Self::AnnotationReplyAdded { timestamp, .. }
            | Self::VoiceCallStarted { timestamp, .. }
            | Self::VoiceCallEnded { timestamp, .. }
            | Self::ScreenShareStarted { timestamp, .. }
            | Self::ScreenShareStopped { timestamp, .. }
            | Self::PlaylistCreated { timestamp, .. }
            | Self::VideoAddedToPlaylist { timestamp, .. }
            | Self::Heartbeat { timestamp, .. } => timestamp,
        }
    }

    /// Get a short description of the event type
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::SessionCreated { .. } => "session_created",
            Self::StateSnapshot { .. } => "state_snapshot",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::PlaybackSynced { .. } => "playback_synced",
            Self::ChatMessageReceived { .. } => "chat_message_received",
            Self::MessageReactionAdded { .. } => "message_reaction_added",
            Self::AnnotationCreated { .. } => "annotation_created",
            Self::AnnotationReplyAdded { .. } => "annotation_reply_added",
            Self::VoiceCallStarted { .. } => "voice_call_started",
            Self::VoiceCallEnded { .. } => "voice_call_ended",
            Self::ScreenShareStarted { .. } => "screen_share_started",
            Self::ScreenShareStopped { .. } => "screen_share_stopped",
            Self::PlaylistCreated { .. } => "playlist_created",
            Self::VideoAddedToPlaylist { .. } => "video_added_to_playlist",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}
