use tokio::sync::mpsc;
use tracing::warn;

use watchparty_core::models::{SessionId, UserId};

use crate::events::SessionEvent;

/// Delivery scope of a queued event
#[derive(Debug, Clone)]
pub enum Scope {
    /// Every current participant of the session
    Session(SessionId),
    /// Every current participant except one (e.g. the originator of a
    /// playback sync)
    SessionExcept(SessionId, UserId),
    /// A single participant (e.g. the join-time state snapshot)
    User(SessionId, UserId),
}

#[derive(Debug, Clone)]
pub struct Envelope {
    pub scope: Scope,
    pub event: SessionEvent,
}

/// Fan-out entry point for outbound events.
///
/// Operation handlers enqueue and return immediately; the single
/// message-processor task drains the queue and is the only path to the
/// transport. One ordered queue gives FIFO delivery per session (and
/// globally) relative to the order operations were accepted.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl BroadcastDispatcher {
    /// Create a dispatcher and the receiving end for the processor task
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Enqueue an event for every participant of a session
    pub fn broadcast(&self, session_id: SessionId, event: SessionEvent) {
        self.enqueue(Envelope {
            scope: Scope::Session(session_id),
            event,
        });
    }

    /// Enqueue an event for every participant except `skip`
    pub fn broadcast_except(&self, session_id: SessionId, skip: UserId, event: SessionEvent) {
        self.enqueue(Envelope {
            scope: Scope::SessionExcept(session_id, skip),
            event,
        });
    }

    /// Enqueue an event for a single participant
    pub fn send_to_user(&self, session_id: SessionId, user_id: UserId, event: SessionEvent) {
        self.enqueue(Envelope {
            scope: Scope::User(session_id, user_id),
            event,
        });
    }

    fn enqueue(&self, envelope: Envelope) {
        if self.tx.send(envelope).is_err() {
            warn!("Broadcast queue closed, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_enqueue_preserves_order() {
        let (dispatcher, mut rx) = BroadcastDispatcher::new();
        let session_id = SessionId::from_string("session12345".to_string());
        let user_id = UserId::from_string("user12345678".to_string());

        dispatcher.send_to_user(
            session_id.clone(),
            user_id.clone(),
            SessionEvent::Heartbeat {
                session_id: session_id.clone(),
                timestamp: Utc::now(),
            },
        );
        dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::UserJoined {
                session_id: session_id.clone(),
                participant: watchparty_core::models::Participant::new(
                    &watchparty_core::models::UserProfile::new(user_id, "alice"),
                    watchparty_core::models::Role::Participant,
                ),
                timestamp: Utc::now(),
            },
        );

        let first = rx.try_recv().expect("first envelope");
        let second = rx.try_recv().expect("second envelope");

        assert!(matches!(first.scope, Scope::User(..)));
        assert_eq!(first.event.event_type(), "heartbeat");
        assert!(matches!(second.scope, Scope::Session(..)));
        assert_eq!(second.event.event_type(), "user_joined");
    }
}
