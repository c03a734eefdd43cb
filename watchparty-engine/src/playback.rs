use chrono::Utc;
use tracing::debug;

use watchparty_core::models::{PermissionBits, PlaybackState, SessionId, UserId};
use watchparty_core::Result;

use crate::dispatch::BroadcastDispatcher;
use crate::events::SessionEvent;
use crate::registry::SessionRegistry;

/// Last-writer-wins playback synchronization.
///
/// Every accepted update is stamped with coordinator time, so
/// ordering is decided here rather than by client clocks. A stale
/// update (older stamp than the stored state) does not overwrite the
/// session, but it is still broadcast so late receivers converge on
/// whichever state they apply last. The broadcast is enqueued while
/// the session lock is still held, so queue order matches acceptance
/// order.
pub struct PlaybackSyncCoordinator {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    sync_tolerance_ms: u64,
}

impl PlaybackSyncCoordinator {
    #[must_use]
    pub fn new(
        registry: SessionRegistry,
        dispatcher: BroadcastDispatcher,
        sync_tolerance_ms: u64,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            sync_tolerance_ms,
        }
    }

    #[must_use]
    pub fn sync_tolerance_ms(&self) -> u64 {
        self.sync_tolerance_ms
    }

    /// Apply a playback update from a participant and broadcast the
    /// stamped state to the other members.
    pub fn sync(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        state: PlaybackState,
    ) -> Result<PlaybackState> {
        self.registry.check_permission(
            session_id,
            user_id,
            PermissionBits::PLAYBACK_CONTROL,
            "sync playback",
        )?;

        let stamped = state.stamped(Utc::now());

        let handle = self.registry.get(session_id)?;
        {
            let mut session = handle.lock();
            if stamped.synced_at > session.playback.synced_at {
                session.playback = stamped.clone();
            } else {
                debug!(
                    session_id = %session_id.as_str(),
                    user_id = %user_id.as_str(),
                    "Stale playback update, keeping newer state"
                );
            }
            self.dispatcher.broadcast_except(
                session_id.clone(),
                user_id.clone(),
                SessionEvent::PlaybackSynced {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    state: stamped.clone(),
                    sync_tolerance_ms: self.sync_tolerance_ms,
                    timestamp: Utc::now(),
                },
            );
        }

        debug!(
            session_id = %session_id.as_str(),
            user_id = %user_id.as_str(),
            position = stamped.position,
            playing = stamped.is_playing,
            "Playback synced"
        );

        Ok(stamped)
    }

    /// Current playback state of a session
    pub fn current(&self, session_id: &SessionId) -> Result<PlaybackState> {
        Ok(self.registry.get(session_id)?.lock().playback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use watchparty_core::models::{Role, SessionConfig, SyncState, UserProfile};

    async fn setup() -> (SessionRegistry, PlaybackSyncCoordinator, SessionId, UserId) {
        let registry = SessionRegistry::new();
        let (dispatcher, _queue_rx) = BroadcastDispatcher::new();
        let host = UserProfile::new(UserId::new(), "host");
        let creation = registry
            .create_session(&host, SessionConfig::new("sync test", 8), "watchparty")
            .await
            .expect("create");
        let coordinator = PlaybackSyncCoordinator::new(registry.clone(), dispatcher, 1000);
        (registry, coordinator, creation.session_id, host.user_id)
    }

    #[tokio::test]
    async fn test_sync_stamps_and_stores() {
        let (_registry, coordinator, session_id, host_id) = setup().await;

        let mut state = PlaybackState::new();
        state.is_playing = true;
        state.position = 42.5;

        let stamped = coordinator
            .sync(&session_id, &host_id, state)
            .expect("sync");
        assert_eq!(stamped.sync_state(), SyncState::Playing);

        let stored = coordinator.current(&session_id).expect("current");
        assert_eq!(stored.position, 42.5);
        assert_eq!(stored.synced_at, stamped.synced_at);
    }

    #[tokio::test]
    async fn test_stale_update_does_not_overwrite() {
        let (registry, coordinator, session_id, host_id) = setup().await;

        let mut state = PlaybackState::new();
        state.position = 100.0;
        coordinator
            .sync(&session_id, &host_id, state)
            .expect("sync");

        // Force the stored stamp into the future so the next update
        // loses the race.
        let handle = registry.get(&session_id).expect("session");
        handle.lock().playback.synced_at = Utc::now() + Duration::seconds(60);

        let mut stale = PlaybackState::new();
        stale.position = 5.0;
        coordinator
            .sync(&session_id, &host_id, stale)
            .expect("sync");

        let stored = coordinator.current(&session_id).expect("current");
        assert_eq!(stored.position, 100.0);
    }

    #[tokio::test]
    async fn test_sync_requires_playback_control() {
        let (registry, coordinator, session_id, host_id) = setup().await;

        let user = UserProfile::new(UserId::new(), "viewer");
        registry
            .join_session(&session_id, &user, None)
            .await
            .expect("join");

        let result = coordinator.sync(&session_id, &user.user_id, PlaybackState::new());
        assert!(result.is_err());

        registry
            .promote_participant(&session_id, &host_id, &user.user_id, Role::Moderator)
            .expect("promote");
        coordinator
            .sync(&session_id, &user.user_id, PlaybackState::new())
            .expect("moderator can sync");
    }

    #[tokio::test]
    async fn test_sync_enqueues_broadcast_to_others() {
        let registry = SessionRegistry::new();
        let (dispatcher, mut queue_rx) = BroadcastDispatcher::new();
        let host = UserProfile::new(UserId::new(), "host");
        let creation = registry
            .create_session(&host, SessionConfig::new("sync test", 8), "watchparty")
            .await
            .expect("create");
        let coordinator = PlaybackSyncCoordinator::new(registry.clone(), dispatcher, 1000);

        let mut state = PlaybackState::new();
        state.position = 12.0;
        coordinator
            .sync(&creation.session_id, &host.user_id, state)
            .expect("sync");

        let envelope = queue_rx.try_recv().expect("queued broadcast");
        assert!(matches!(
            envelope.scope,
            crate::dispatch::Scope::SessionExcept(_, ref skip) if *skip == host.user_id
        ));
        match envelope.event {
            SessionEvent::PlaybackSynced {
                state,
                sync_tolerance_ms,
                ..
            } => {
                assert_eq!(state.position, 12.0);
                assert_eq!(sync_tolerance_ms, 1000);
            }
            other => panic!("unexpected event {}", other.event_type()),
        }
    }
}
