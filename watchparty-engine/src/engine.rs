use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use watchparty_core::models::{
    Annotation, AnnotationData, AnnotationReply, ChatMessage, MessageKind, Participant,
    PlaybackState,
    PlaylistId, PlaylistVideo, Role, ScreenShare, SessionConfig, SessionId, ShareConfig,
    SharedPlaylist, UserId, VoiceCall,
};
use watchparty_core::{EngineConfig, Error, Result};

use crate::calls::CallCoordinator;
use crate::dispatch::{BroadcastDispatcher, Envelope, Scope};
use crate::events::SessionEvent;
use crate::messaging::MessagingSubsystem;
use crate::playback::PlaybackSyncCoordinator;
use crate::playlists::PlaylistCoordinator;
use crate::presence::PresenceTracker;
use crate::registry::{JoinError, JoinSnapshot, SessionCreation, SessionRegistry};
use crate::transport::{IdentityProvider, Transport};

/// Point-in-time view of engine load
#[derive(Debug, Clone)]
pub struct CollaborationStats {
    pub active_sessions: usize,
    pub total_participants: usize,
    pub connected_users: usize,
    pub total_messages: usize,
    pub total_annotations: usize,
    pub active_calls: usize,
    pub active_shares: usize,
    pub playlist_count: usize,
    pub average_latency_ms: Option<f64>,
    /// Coarse quality score in (0, 1] derived from average latency
    pub connection_quality: f64,
}

/// The engine facade: owns every subsystem and the background tasks.
///
/// All operations resolve the acting user through the
/// [`IdentityProvider`] and emit their events through the single FIFO
/// dispatch queue, so any two events for the same session reach every
/// common recipient in the same order.
pub struct CollaborationEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    registry: SessionRegistry,
    playback: PlaybackSyncCoordinator,
    messaging: MessagingSubsystem,
    calls: CallCoordinator,
    playlists: PlaylistCoordinator,
    presence: Arc<PresenceTracker>,
    dispatcher: BroadcastDispatcher,
    // Receiver parked here between construction and start.
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    started: AtomicBool,
}

impl CollaborationEngine {
    #[must_use]
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let registry = SessionRegistry::new();
        let (dispatcher, queue_rx) = BroadcastDispatcher::new();
        Self {
            playback: PlaybackSyncCoordinator::new(
                registry.clone(),
                dispatcher.clone(),
                config.session.sync_tolerance_ms,
            ),
            messaging: MessagingSubsystem::new(
                registry.clone(),
                dispatcher.clone(),
                config.session.chat_history_limit,
            ),
            calls: CallCoordinator::new(registry.clone(), dispatcher.clone()),
            playlists: PlaylistCoordinator::new(registry.clone(), dispatcher.clone()),
            presence: Arc::new(PresenceTracker::new(config.tasks.away_threshold_secs)),
            registry,
            config,
            transport,
            identity,
            dispatcher,
            queue_rx: Mutex::new(Some(queue_rx)),
            handles: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the background tasks. Must be called exactly once before
    /// any operation.
    pub fn start(self: Arc<Self>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyExists("Engine already started".to_string()));
        }
        let queue_rx = self
            .queue_rx
            .lock()
            .take()
            .ok_or(Error::NotInitialized)?;

        let mut handles = self.handles.lock();
        handles.push(tokio::spawn(self.clone().message_processor(queue_rx)));
        handles.push(tokio::spawn(self.clone().heartbeat_task()));
        handles.push(tokio::spawn(self.clone().presence_task()));
        handles.push(tokio::spawn(self.clone().monitor_task()));

        info!(
            heartbeat_secs = self.config.tasks.heartbeat_interval_secs,
            presence_secs = self.config.tasks.presence_interval_secs,
            monitor_secs = self.config.tasks.monitor_interval_secs,
            "Collaboration engine started"
        );
        Ok(())
    }

    /// Cancel the background tasks and release all in-memory state.
    /// Playlists outlive their session, but not the engine.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "Background task panicked during shutdown");
            }
        }
        self.registry.clear();
        self.presence.clear();
        self.messaging.clear();
        self.calls.clear();
        self.playlists.clear();
        self.started.store(false, Ordering::SeqCst);
        info!("Collaboration engine stopped");
    }

    fn ensure_started(&self) -> Result<()> {
        if self.started.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    // ---- background tasks ----

    /// Drains the dispatch queue in order, resolving recipients at
    /// delivery time. One drain loop preserves FIFO per session.
    async fn message_processor(
        self: Arc<Self>,
        mut queue_rx: mpsc::UnboundedReceiver<Envelope>,
    ) {
        loop {
            tokio::select! {
                envelope = queue_rx.recv() => {
                    let Some(envelope) = envelope else { break };
                    self.deliver(envelope).await;
                }
                () = self.cancel.cancelled() => break,
            }
        }
        debug!("Message processor stopped");
    }

    async fn deliver(&self, envelope: Envelope) {
        let recipients: Vec<UserId> = match &envelope.scope {
            Scope::Session(session_id) => self.registry.participant_ids(session_id),
            Scope::SessionExcept(session_id, skip) => self
                .registry
                .participant_ids(session_id)
                .into_iter()
                .filter(|u| u != skip)
                .collect(),
            Scope::User(_, user_id) => vec![user_id.clone()],
        };

        for user_id in recipients {
            if let Err(err) = self.transport.deliver(&user_id, &envelope.event).await {
                warn!(
                    user_id = %user_id.as_str(),
                    event_type = envelope.event.event_type(),
                    error = %err,
                    "Event delivery failed"
                );
            }
        }
    }

    async fn heartbeat_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.tasks.heartbeat_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for session_id in self.registry.session_ids() {
                        self.dispatcher.broadcast(
                            session_id.clone(),
                            SessionEvent::Heartbeat {
                                session_id,
                                timestamp: Utc::now(),
                            },
                        );
                    }
                }
                () = self.cancel.cancelled() => break,
            }
        }
        debug!("Heartbeat task stopped");
    }

    async fn presence_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.tasks.presence_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => self.presence.refresh_statuses(),
                () = self.cancel.cancelled() => break,
            }
        }
        debug!("Presence task stopped");
    }

    /// Evicts users whose connections have gone silent past the
    /// liveness timeout.
    async fn monitor_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.tasks.monitor_interval_secs,
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let stale = self.presence.stale_users(self.config.tasks.presence_timeout_secs);
                    for user_id in stale {
                        let Some(connected) = self.presence.remove(&user_id) else { continue };
                        warn!(
                            user_id = %user_id.as_str(),
                            display_name = %connected.profile.display_name,
                            "Evicting unresponsive user"
                        );
                        for session_id in self.registry.sessions_of(&user_id) {
                            self.remove_from_session(
                                &session_id,
                                &user_id,
                                &connected.profile.display_name,
                            );
                        }
                    }
                }
                () = self.cancel.cancelled() => break,
            }
        }
        debug!("Connection monitor stopped");
    }

    // ---- session lifecycle ----

    /// Create a session with the caller as host. A capacity of zero
    /// means "use the configured default".
    pub async fn create_session(&self, mut config: SessionConfig) -> Result<SessionCreation> {
        self.ensure_started()?;
        let host = self.identity.current_user().await?;
        self.presence.register(host.clone());

        if config.max_participants == 0 {
            config.max_participants = self.config.session.default_max_participants;
        }

        let name = config.name.clone();
        let creation = self
            .registry
            .create_session(&host, config, &self.config.session.join_url_scheme)
            .await?;

        self.dispatcher.broadcast(
            creation.session_id.clone(),
            SessionEvent::SessionCreated {
                session_id: creation.session_id.clone(),
                host_id: host.user_id,
                name,
                timestamp: Utc::now(),
            },
        );
        Ok(creation)
    }

    /// Join a session. The new participant receives a state snapshot
    /// before any event broadcast after the join, so it never sees an
    /// event referencing state it does not have. Both join events are
    /// enqueued while the session lock is still held.
    pub async fn join_session(
        &self,
        session_id: &SessionId,
        password: Option<&str>,
    ) -> std::result::Result<JoinSnapshot, JoinError> {
        self.ensure_started()?;
        let user = self.identity.current_user().await.map_err(JoinError::Engine)?;
        self.presence.register(user.clone());

        let snapshot = self
            .registry
            .join_session_with(session_id, &user, password, |snapshot| {
                self.dispatcher.send_to_user(
                    session_id.clone(),
                    snapshot.participant.user_id.clone(),
                    SessionEvent::StateSnapshot {
                        session_id: session_id.clone(),
                        playback: snapshot.playback.clone(),
                        participants: snapshot.participants.clone(),
                        chat_history: self.messaging.history(session_id),
                        annotations: self.messaging.annotations(session_id),
                        timestamp: Utc::now(),
                    },
                );
                self.dispatcher.broadcast_except(
                    session_id.clone(),
                    snapshot.participant.user_id.clone(),
                    SessionEvent::UserJoined {
                        session_id: session_id.clone(),
                        participant: snapshot.participant.clone(),
                        timestamp: Utc::now(),
                    },
                );
            })
            .await?;
        Ok(snapshot)
    }

    /// Leave a session. Idempotent.
    pub async fn leave_session(&self, session_id: &SessionId) -> Result<()> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.remove_from_session(session_id, &user.user_id, &user.display_name);
        Ok(())
    }

    /// Shared removal path for voluntary leave, bans, and liveness
    /// eviction. Ending calls and shares broadcasts their teardown
    /// events from inside the call coordinator.
    fn remove_from_session(&self, session_id: &SessionId, user_id: &UserId, display_name: &str) {
        self.calls.end_for_user(session_id, user_id);

        let outcome = self.registry.leave_session(session_id, user_id);
        if let Some(removed) = outcome.removed {
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::UserLeft {
                    session_id: session_id.clone(),
                    user_id: user_id.clone(),
                    display_name: display_name.to_string(),
                    timestamp: Utc::now(),
                },
            );
            debug!(
                session_id = %session_id.as_str(),
                user_id = %removed.user_id.as_str(),
                "Participant removed"
            );
        }
        if outcome.destroyed {
            // Playlists deliberately survive the session.
            self.messaging.remove_session(session_id);
            self.calls.remove_session(session_id);
        }
    }

    pub async fn invite_user(&self, session_id: &SessionId, target: UserId) -> Result<()> {
        self.ensure_started()?;
        let caller = self.identity.current_user().await?;
        self.registry.invite_user(session_id, &caller.user_id, target)
    }

    /// Ban a user, evicting them if currently a member
    pub async fn ban_user(&self, session_id: &SessionId, target: &UserId) -> Result<()> {
        self.ensure_started()?;
        let caller = self.identity.current_user().await?;
        let removed = self.registry.ban_user(session_id, &caller.user_id, target)?;

        if let Some(participant) = removed {
            self.calls.end_for_user(session_id, target);
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::UserLeft {
                    session_id: session_id.clone(),
                    user_id: target.clone(),
                    display_name: participant.display_name,
                    timestamp: Utc::now(),
                },
            );
        }
        Ok(())
    }

    pub async fn promote_participant(
        &self,
        session_id: &SessionId,
        target: &UserId,
        role: Role,
    ) -> Result<Participant> {
        self.ensure_started()?;
        let caller = self.identity.current_user().await?;
        self.registry
            .promote_participant(session_id, &caller.user_id, target, role)
    }

    // ---- playback ----

    /// Apply a last-writer-wins playback update. The coordinator
    /// broadcasts the stamped state to the other participants.
    pub async fn sync_playback(
        &self,
        session_id: &SessionId,
        state: PlaybackState,
    ) -> Result<PlaybackState> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);
        self.playback.sync(session_id, &user.user_id, state)
    }

    // ---- messaging ----

    pub async fn send_chat_message(
        &self,
        session_id: &SessionId,
        content: String,
    ) -> Result<ChatMessage> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);

        self.messaging
            .send_chat(session_id, &user.user_id, content, MessageKind::Text)
    }

    pub async fn add_reaction(
        &self,
        session_id: &SessionId,
        message_id: &str,
        emoji: &str,
    ) -> Result<()> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.messaging
            .add_reaction(session_id, &user.user_id, message_id, emoji)?;
        Ok(())
    }

    pub async fn create_annotation(
        &self,
        session_id: &SessionId,
        data: AnnotationData,
    ) -> Result<Annotation> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);

        self.messaging.create_annotation(session_id, &user.user_id, data)
    }

    pub async fn add_annotation_reply(
        &self,
        session_id: &SessionId,
        annotation_id: &str,
        content: String,
    ) -> Result<AnnotationReply> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.messaging
            .add_annotation_reply(session_id, &user.user_id, annotation_id, content)
    }

    // ---- calls ----

    pub async fn start_voice_call(
        &self,
        session_id: &SessionId,
        invitees: Option<Vec<UserId>>,
    ) -> Result<VoiceCall> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);
        self.calls.start_voice_call(session_id, &user.user_id, invitees)
    }

    pub async fn leave_voice_call(&self, session_id: &SessionId, call_id: &str) -> Result<()> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.calls.leave_voice_call(session_id, &user.user_id, call_id);
        Ok(())
    }

    pub async fn start_screen_share(
        &self,
        session_id: &SessionId,
        config: ShareConfig,
    ) -> Result<ScreenShare> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);
        self.calls.start_screen_share(session_id, &user.user_id, config)
    }

    pub async fn stop_screen_share(&self, session_id: &SessionId, share_id: &str) -> Result<()> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.calls.stop_screen_share(session_id, &user.user_id, share_id);
        Ok(())
    }

    // ---- playlists ----

    pub async fn create_shared_playlist(
        &self,
        session_id: &SessionId,
        name: String,
        videos: Vec<PlaylistVideo>,
        collaborative: bool,
    ) -> Result<SharedPlaylist> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        self.presence.mark_active(&user.user_id);
        self.playlists
            .create(session_id, &user.user_id, name, videos, collaborative)
    }

    /// Append a video. The broadcast only reaches a session that still
    /// exists; edits to orphaned playlists are silent.
    pub async fn add_to_shared_playlist(
        &self,
        playlist_id: &PlaylistId,
        video: PlaylistVideo,
    ) -> Result<SharedPlaylist> {
        self.ensure_started()?;
        let user = self.identity.current_user().await?;
        let (_, playlist) = self.playlists.add_video(playlist_id, &user.user_id, video)?;
        Ok(playlist)
    }

    // ---- presence and stats ----

    /// Feed a round-trip latency sample for a connected user
    pub fn record_latency(&self, user_id: &UserId, latency_ms: u64) {
        self.presence.record_latency(user_id, latency_ms);
    }

    #[must_use]
    pub fn get_collaboration_stats(&self) -> CollaborationStats {
        let average_latency_ms = self.presence.average_latency_ms();
        CollaborationStats {
            active_sessions: self.registry.session_count(),
            total_participants: self.registry.total_participants(),
            connected_users: self.presence.connected_count(),
            total_messages: self.messaging.total_messages(),
            total_annotations: self.messaging.total_annotations(),
            active_calls: self.calls.total_active_calls(),
            active_shares: self.calls.total_active_shares(),
            playlist_count: self.playlists.playlist_count(),
            average_latency_ms,
            connection_quality: connection_quality_score(average_latency_ms),
        }
    }
}

/// Bucketed quality score from average latency. No samples reads as
/// perfect quality.
#[must_use]
pub fn connection_quality_score(average_latency_ms: Option<f64>) -> f64 {
    match average_latency_ms {
        None => 1.0,
        Some(ms) if ms < 50.0 => 1.0,
        Some(ms) if ms < 100.0 => 0.8,
        Some(ms) if ms < 200.0 => 0.6,
        Some(ms) if ms < 500.0 => 0.4,
        Some(_) => 0.2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_buckets() {
        assert_eq!(connection_quality_score(None), 1.0);
        assert_eq!(connection_quality_score(Some(10.0)), 1.0);
        assert_eq!(connection_quality_score(Some(50.0)), 0.8);
        assert_eq!(connection_quality_score(Some(150.0)), 0.6);
        assert_eq!(connection_quality_score(Some(450.0)), 0.4);
        assert_eq!(connection_quality_score(Some(2000.0)), 0.2);
    }
}
