use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use watchparty_core::models::{
    Annotation, AnnotationData, AnnotationReply, ChatMessage, MessageKind, PermissionBits,
    SessionId, UserId,
};
use watchparty_core::{Error, Result};

use crate::dispatch::BroadcastDispatcher;
use crate::events::SessionEvent;
use crate::registry::SessionRegistry;

/// Chat and timestamped annotations, stored per session.
///
/// Chat history is a bounded FIFO: when a session reaches the history
/// limit the oldest message is evicted. Annotations accumulate without
/// a cap and only disappear with their session.
///
/// Every mutation enqueues its broadcast while still holding the lock
/// that serialized it, so the queue order always matches the log
/// order.
pub struct MessagingSubsystem {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    chats: DashMap<SessionId, Arc<Mutex<VecDeque<ChatMessage>>>>,
    annotations: DashMap<SessionId, Arc<Mutex<Vec<Annotation>>>>,
    history_limit: usize,
}

impl MessagingSubsystem {
    #[must_use]
    pub fn new(
        registry: SessionRegistry,
        dispatcher: BroadcastDispatcher,
        history_limit: usize,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            chats: DashMap::new(),
            annotations: DashMap::new(),
            history_limit,
        }
    }

    /// Append a chat message, evicting the oldest one past the cap
    pub fn send_chat(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        content: String,
        kind: MessageKind,
    ) -> Result<ChatMessage> {
        if content.is_empty() {
            return Err(Error::InvalidInput("Message cannot be empty".to_string()));
        }
        self.registry
            .check_permission(session_id, user_id, PermissionBits::SEND_CHAT, "send chat")?;

        let message = ChatMessage::new(session_id.clone(), user_id.clone(), content, kind);

        let history = self
            .chats
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone();
        {
            let mut history = history.lock();
            history.push_back(message.clone());
            while history.len() > self.history_limit {
                history.pop_front();
            }
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::ChatMessageReceived {
                    session_id: session_id.clone(),
                    message: message.clone(),
                    timestamp: Utc::now(),
                },
            );
        }

        debug!(
            session_id = %session_id.as_str(),
            user_id = %user_id.as_str(),
            message_id = %message.id,
            "Chat message stored"
        );

        Ok(message)
    }

    /// Add an emoji reaction to an existing message
    pub fn add_reaction(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        message_id: &str,
        emoji: &str,
    ) -> Result<ChatMessage> {
        self.registry
            .check_permission(session_id, user_id, PermissionBits::SEND_CHAT, "react")?;

        let history = self
            .chats
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("No chat history for session {session_id}")))?;

        let mut history = history.lock();
        let message = history
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| Error::NotFound(format!("Message {message_id} not found")))?;
        message.add_reaction(emoji);
        self.dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::MessageReactionAdded {
                session_id: session_id.clone(),
                message_id: message_id.to_string(),
                user_id: user_id.clone(),
                emoji: emoji.to_string(),
                timestamp: Utc::now(),
            },
        );
        Ok(message.clone())
    }

    /// Create a timestamped annotation on the video
    pub fn create_annotation(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        data: AnnotationData,
    ) -> Result<Annotation> {
        self.registry
            .check_permission(session_id, user_id, PermissionBits::ANNOTATE, "annotate")?;

        let annotation = Annotation::new(session_id.clone(), user_id.clone(), data);

        let annotations = self
            .annotations
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();
        {
            let mut annotations = annotations.lock();
            annotations.push(annotation.clone());
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::AnnotationCreated {
                    session_id: session_id.clone(),
                    annotation: annotation.clone(),
                    timestamp: Utc::now(),
                },
            );
        }

        debug!(
            session_id = %session_id.as_str(),
            user_id = %user_id.as_str(),
            annotation_id = %annotation.id,
            video_time = annotation.video_time,
            "Annotation created"
        );

        Ok(annotation)
    }

    /// Reply to an annotation thread
    pub fn add_annotation_reply(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        annotation_id: &str,
        content: String,
    ) -> Result<AnnotationReply> {
        if content.is_empty() {
            return Err(Error::InvalidInput("Reply cannot be empty".to_string()));
        }
        self.registry
            .check_permission(session_id, user_id, PermissionBits::ANNOTATE, "reply")?;

        let annotations = self
            .annotations
            .get(session_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("No annotations for session {session_id}")))?;

        let mut annotations = annotations.lock();
        let annotation = annotations
            .iter_mut()
            .find(|a| a.id == annotation_id)
            .ok_or_else(|| Error::NotFound(format!("Annotation {annotation_id} not found")))?;

        let reply = AnnotationReply::new(user_id.clone(), content);
        annotation.push_reply(reply.clone());
        self.dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::AnnotationReplyAdded {
                session_id: session_id.clone(),
                annotation_id: annotation_id.to_string(),
                reply: reply.clone(),
                timestamp: Utc::now(),
            },
        );
        Ok(reply)
    }

    /// Chat history in arrival order, oldest first
    #[must_use]
    pub fn history(&self, session_id: &SessionId) -> Vec<ChatMessage> {
        self.chats
            .get(session_id)
            .map(|e| e.value().lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn annotations(&self, session_id: &SessionId) -> Vec<Annotation> {
        self.annotations
            .get(session_id)
            .map(|e| e.value().lock().clone())
            .unwrap_or_default()
    }

    /// Drop all state for a destroyed session
    pub fn remove_session(&self, session_id: &SessionId) {
        self.chats.remove(session_id);
        self.annotations.remove(session_id);
    }

    /// Drop all messaging state (engine shutdown)
    pub fn clear(&self) {
        self.chats.clear();
        self.annotations.clear();
    }

    #[must_use]
    pub fn total_messages(&self) -> usize {
        self.chats.iter().map(|e| e.value().lock().len()).sum()
    }

    #[must_use]
    pub fn total_annotations(&self) -> usize {
        self.annotations
            .iter()
            .map(|e| e.value().lock().len())
            .sum()
    }
}
