//! End-to-end scenario: a private watch session with a password and a
//! capacity of two, exercised through the engine facade with an
//! in-memory transport.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use watchparty_core::models::{
    PlaybackState, SessionConfig, UserId, UserProfile, Visibility,
};
use watchparty_core::{EngineConfig, Result};
use watchparty_engine::{
    CollaborationEngine, IdentityProvider, JoinError, SessionEvent, Transport,
};

/// Records every delivered event per recipient
#[derive(Default)]
struct CapturingTransport {
    inboxes: Mutex<HashMap<UserId, Vec<SessionEvent>>>,
}

impl CapturingTransport {
    fn events_for(&self, user_id: &UserId) -> Vec<SessionEvent> {
        self.inboxes
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for CapturingTransport {
    async fn deliver(&self, user_id: &UserId, event: &SessionEvent) -> Result<()> {
        self.inboxes
            .lock()
            .entry(user_id.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }
}

/// Identity provider whose current user the test switches between
/// operations
struct SwitchableIdentity {
    current: Mutex<UserProfile>,
}

impl SwitchableIdentity {
    fn new(profile: UserProfile) -> Self {
        Self {
            current: Mutex::new(profile),
        }
    }

    fn switch_to(&self, profile: &UserProfile) {
        *self.current.lock() = profile.clone();
    }
}

#[async_trait]
impl IdentityProvider for SwitchableIdentity {
    async fn current_user(&self) -> Result<UserProfile> {
        Ok(self.current.lock().clone())
    }
}

async fn drain() {
    // Give the processor task a chance to flush the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn private_watch_session_end_to_end() {
    let host_a = UserProfile::new(UserId::new(), "alice");
    let user_b = UserProfile::new(UserId::new(), "bob");
    let user_c = UserProfile::new(UserId::new(), "carol");

    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host_a.clone()));
    let engine = Arc::new(CollaborationEngine::new(
        EngineConfig::default(),
        transport.clone(),
        identity.clone(),
    ));
    engine.clone().start().expect("start engine");

    // Host A creates a private, password-protected session for two.
    let mut config = SessionConfig::new("movie night", 2);
    config.visibility = Visibility::Private;
    config.password = Some("hunter2".to_string());
    let creation = engine.create_session(config).await.expect("create session");
    let session_id = creation.session_id.clone();
    assert!(creation.join_url.contains(session_id.as_str()));

    engine
        .invite_user(&session_id, user_b.user_id.clone())
        .await
        .expect("invite b");
    engine
        .invite_user(&session_id, user_c.user_id.clone())
        .await
        .expect("invite c");

    // B joins with the right password and fills the session.
    identity.switch_to(&user_b);
    let snapshot = engine
        .join_session(&session_id, Some("hunter2"))
        .await
        .expect("b joins");
    assert_eq!(snapshot.participants.len(), 2);

    // C is invited and knows the password but the session is full.
    identity.switch_to(&user_c);
    let result = engine.join_session(&session_id, Some("hunter2")).await;
    assert!(matches!(result, Err(JoinError::SessionFull)));

    // A seeks to the 30 second mark and starts playback.
    identity.switch_to(&host_a);
    let mut state = PlaybackState::new();
    state.is_playing = true;
    state.position = 30.0;
    engine
        .sync_playback(&session_id, state)
        .await
        .expect("sync playback");

    // A says hello.
    let message = engine
        .send_chat_message(&session_id, "hello!".to_string())
        .await
        .expect("send chat");

    drain().await;

    // B got the snapshot before anything else, then saw the playback
    // update and the chat message.
    let b_events = transport.events_for(&user_b.user_id);
    assert!(
        matches!(b_events.first(), Some(SessionEvent::StateSnapshot { .. })),
        "first event for B should be the snapshot, got {b_events:?}"
    );
    let b_playback = b_events.iter().find_map(|e| match e {
        SessionEvent::PlaybackSynced { state, user_id, .. } => Some((state, user_id)),
        _ => None,
    });
    let (b_state, b_origin) = b_playback.expect("B receives playback sync");
    assert!(b_state.is_playing);
    assert!(b_state.position >= 30.0);
    assert_eq!(*b_origin, host_a.user_id);

    assert!(b_events.iter().any(|e| matches!(
        e,
        SessionEvent::ChatMessageReceived { message: m, .. } if m.id == message.id
    )));

    // A hears their own chat message but not their own playback echo.
    let a_events = transport.events_for(&host_a.user_id);
    assert!(a_events
        .iter()
        .any(|e| matches!(e, SessionEvent::ChatMessageReceived { .. })));
    assert!(!a_events
        .iter()
        .any(|e| matches!(e, SessionEvent::PlaybackSynced { .. })));
    assert!(a_events.iter().any(|e| matches!(
        e,
        SessionEvent::UserJoined { participant, .. } if participant.user_id == user_b.user_id
    )));

    // C never got anything.
    assert!(transport.events_for(&user_c.user_id).is_empty());

    let stats = engine.get_collaboration_stats();
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_participants, 2);
    assert_eq!(stats.total_messages, 1);
    assert_eq!(stats.connection_quality, 1.0);

    engine.shutdown().await;
}

#[tokio::test]
async fn session_destroyed_when_empty_but_playlist_survives() {
    let host = UserProfile::new(UserId::new(), "host");
    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host.clone()));
    let engine = Arc::new(CollaborationEngine::new(
        EngineConfig::default(),
        transport.clone(),
        identity.clone(),
    ));
    engine.clone().start().expect("start engine");

    let creation = engine
        .create_session(SessionConfig::new("solo", 4))
        .await
        .expect("create");
    let session_id = creation.session_id.clone();

    let playlist = engine
        .create_shared_playlist(&session_id, "queue".to_string(), vec![], true)
        .await
        .expect("create playlist");

    engine.leave_session(&session_id).await.expect("leave");

    // Session gone: joining it again fails.
    let result = engine.join_session(&session_id, None).await;
    assert!(matches!(result, Err(JoinError::SessionNotFound)));

    // The playlist remains editable by its creator.
    let updated = engine
        .add_to_shared_playlist(
            &playlist.id,
            watchparty_core::models::PlaylistVideo {
                url: "https://example.com/v1".to_string(),
                title: "v1".to_string(),
                duration_secs: Some(120.0),
            },
        )
        .await
        .expect("edit orphaned playlist");
    assert_eq!(updated.len(), 1);

    let stats = engine.get_collaboration_stats();
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.playlist_count, 1);

    engine.shutdown().await;
}

#[tokio::test]
async fn stats_count_screen_shares() {
    let host = UserProfile::new(UserId::new(), "host");
    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host.clone()));
    let engine = Arc::new(CollaborationEngine::new(
        EngineConfig::default(),
        transport,
        identity,
    ));
    engine.clone().start().expect("start engine");

    let creation = engine
        .create_session(SessionConfig::new("share night", 4))
        .await
        .expect("create");

    let share = engine
        .start_screen_share(&creation.session_id, Default::default())
        .await
        .expect("start share");

    let stats = engine.get_collaboration_stats();
    assert_eq!(stats.active_shares, 1);
    assert_eq!(stats.active_calls, 0);

    engine
        .stop_screen_share(&creation.session_id, &share.id)
        .await
        .expect("stop share");
    assert_eq!(engine.get_collaboration_stats().active_shares, 0);

    engine.shutdown().await;
}

#[tokio::test]
async fn shutdown_releases_all_state() {
    let host = UserProfile::new(UserId::new(), "host");
    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host.clone()));
    let engine = Arc::new(CollaborationEngine::new(
        EngineConfig::default(),
        transport,
        identity,
    ));
    engine.clone().start().expect("start engine");

    let creation = engine
        .create_session(SessionConfig::new("short lived", 4))
        .await
        .expect("create");
    engine
        .send_chat_message(&creation.session_id, "hello".to_string())
        .await
        .expect("chat");
    engine
        .create_shared_playlist(&creation.session_id, "queue".to_string(), vec![], true)
        .await
        .expect("playlist");
    engine
        .start_voice_call(&creation.session_id, None)
        .await
        .expect("call");
    engine
        .start_screen_share(&creation.session_id, Default::default())
        .await
        .expect("share");

    engine.shutdown().await;

    let stats = engine.get_collaboration_stats();
    assert_eq!(stats.active_sessions, 0);
    assert_eq!(stats.total_participants, 0);
    assert_eq!(stats.connected_users, 0);
    assert_eq!(stats.total_messages, 0);
    assert_eq!(stats.total_annotations, 0);
    assert_eq!(stats.active_calls, 0);
    assert_eq!(stats.active_shares, 0);
    assert_eq!(stats.playlist_count, 0);
}

#[tokio::test]
async fn zero_capacity_falls_back_to_configured_default() {
    let host = UserProfile::new(UserId::new(), "host");
    let guest = UserProfile::new(UserId::new(), "guest");
    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host.clone()));

    let mut config = EngineConfig::default();
    config.session.default_max_participants = 1;
    let engine = Arc::new(CollaborationEngine::new(config, transport, identity.clone()));
    engine.clone().start().expect("start engine");

    let creation = engine
        .create_session(SessionConfig::new("defaults", 0))
        .await
        .expect("zero capacity uses the default");

    // The default cap of one is already taken by the host.
    identity.switch_to(&guest);
    let result = engine.join_session(&creation.session_id, None).await;
    assert!(matches!(result, Err(JoinError::SessionFull)));

    engine.shutdown().await;
}

#[tokio::test]
async fn operations_require_started_engine() {
    let host = UserProfile::new(UserId::new(), "host");
    let transport = Arc::new(CapturingTransport::default());
    let identity = Arc::new(SwitchableIdentity::new(host.clone()));
    let engine = Arc::new(CollaborationEngine::new(
        EngineConfig::default(),
        transport,
        identity,
    ));

    let result = engine.create_session(SessionConfig::new("too early", 4)).await;
    assert!(matches!(
        result,
        Err(watchparty_core::Error::NotInitialized)
    ));

    engine.clone().start().expect("start");
    assert!(engine.clone().start().is_err(), "second start must fail");
    engine.shutdown().await;
}
