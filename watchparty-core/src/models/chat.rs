use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::id::{generate_id, SessionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    System,
    Emote,
}

/// A chat message in a session.
///
/// Core fields are immutable once created; only reaction counts and
/// the edit marker may change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String, // nanoid(12)
    pub session_id: SessionId,
    pub user_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
    /// emoji -> count
    #[serde(default)]
    pub reactions: HashMap<String, u32>,
    #[serde(default)]
    pub edited: bool,
}

impl ChatMessage {
    pub fn new(
        session_id: SessionId,
        user_id: UserId,
        content: String,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: generate_id(),
            session_id,
            user_id,
            content,
            kind,
            created_at: Utc::now(),
            reactions: HashMap::new(),
            edited: false,
        }
    }

    pub fn add_reaction(&mut self, emoji: &str) {
        *self.reactions.entry(emoji.to_string()).or_insert(0) += 1;
    }

    pub fn mark_edited(&mut self, content: String) {
        self.content = content;
        self.edited = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    #[default]
    Note,
    Marker,
    Drawing,
}

/// Normalized screen coordinates for positioned annotations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPosition {
    pub x: f32,
    pub y: f32,
}

/// Payload for creating an annotation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationData {
    /// Video timestamp in seconds the annotation refers to
    pub video_time: f64,
    pub content: String,
    #[serde(default)]
    pub kind: AnnotationKind,
    pub position: Option<ScreenPosition>,
    pub style: Option<String>,
}

/// Reply to an annotation (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationReply {
    pub id: String, // nanoid(12)
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl AnnotationReply {
    pub fn new(user_id: UserId, content: String) -> Self {
        Self {
            id: generate_id(),
            user_id,
            content,
            created_at: Utc::now(),
        }
    }
}

/// A timestamped annotation on the shared video.
///
/// Annotations are durable content: they are never auto-expired, and
/// core fields are immutable. Replies are append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String, // nanoid(12)
    pub session_id: SessionId,
    pub user_id: UserId,
    pub video_time: f64,
    pub content: String,
    pub kind: AnnotationKind,
    pub position: Option<ScreenPosition>,
    pub style: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<AnnotationReply>,
}

impl Annotation {
    pub fn new(session_id: SessionId, user_id: UserId, data: AnnotationData) -> Self {
        Self {
            id: generate_id(),
            session_id,
            user_id,
            video_time: data.video_time,
            content: data.content,
            kind: data.kind,
            position: data.position,
            style: data.style,
            created_at: Utc::now(),
            replies: Vec::new(),
        }
    }

    pub fn push_reply(&mut self, reply: AnnotationReply) {
        self.replies.push(reply);
    }
}
