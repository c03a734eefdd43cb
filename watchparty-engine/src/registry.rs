use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use watchparty_core::auth::{hash_password, verify_password};
use watchparty_core::models::{
    Participant, PermissionBits, PlaybackState, Role, Session, SessionConfig, SessionId, UserId,
    UserProfile,
};
use watchparty_core::{Error, Result};

/// Typed join failures a caller must branch on.
///
/// The validation order is a contract: existence, capacity, ban list,
/// visibility, password. The first failing check wins, so the error a
/// client observes is reproducible when several conditions fail at
/// once.
#[derive(Debug, Error)]
pub enum JoinError {
    #[error("session not found")]
    SessionNotFound,

    #[error("session is full")]
    SessionFull,

    #[error("user is banned from this session")]
    UserBanned,

    #[error("session is private")]
    PrivateSession,

    #[error("invalid session password")]
    InvalidPassword,

    #[error(transparent)]
    Engine(#[from] Error),
}

/// Result of a successful join: the caller's own participant record
/// plus the snapshot it needs to render the session.
#[derive(Debug, Clone)]
pub struct JoinSnapshot {
    pub participant: Participant,
    pub participants: Vec<Participant>,
    pub playback: PlaybackState,
}

#[derive(Debug, Clone)]
pub struct SessionCreation {
    pub session_id: SessionId,
    pub join_url: String,
}

/// Outcome of a leave request. Leaving is idempotent: both fields stay
/// empty when the caller was not a member.
#[derive(Debug, Clone, Default)]
pub struct LeaveOutcome {
    pub removed: Option<Participant>,
    pub destroyed: bool,
}

type SharedSession = Arc<Mutex<Session>>;

/// Owns the table of active sessions and participant membership.
///
/// Sessions are keyed in a concurrent map; each entry carries its own
/// lock, so mutations on one session never serialize behind another.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<SessionId, SharedSession>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Create a session with the caller as host
    pub async fn create_session(
        &self,
        host: &UserProfile,
        config: SessionConfig,
        url_scheme: &str,
    ) -> Result<SessionCreation> {
        if config.name.is_empty() {
            return Err(Error::InvalidInput("Session name cannot be empty".to_string()));
        }
        if config.name.len() > 255 {
            return Err(Error::InvalidInput("Session name too long".to_string()));
        }
        if config.max_participants == 0 {
            return Err(Error::InvalidInput(
                "Session must allow at least one participant".to_string(),
            ));
        }

        let password_hash = match config.password {
            Some(ref password) => Some(hash_password(password).await?),
            None => None,
        };

        let session = Session::new(
            host,
            config.name,
            config.visibility,
            password_hash,
            config.max_participants,
            config.overrides,
        );
        let session_id = session.id.clone();
        let join_url = format!("{url_scheme}://join/{session_id}");

        self.sessions
            .insert(session_id.clone(), Arc::new(Mutex::new(session)));

        info!(
            session_id = %session_id.as_str(),
            host_id = %host.user_id.as_str(),
            "Session created"
        );

        Ok(SessionCreation {
            session_id,
            join_url,
        })
    }

    /// Join a session.
    ///
    /// Re-joining a session the caller is already in refreshes the
    /// participant and succeeds with a fresh snapshot.
    pub async fn join_session(
        &self,
        session_id: &SessionId,
        user: &UserProfile,
        password: Option<&str>,
    ) -> std::result::Result<JoinSnapshot, JoinError> {
        self.join_session_with(session_id, user, password, |_| {}).await
    }

    /// Join a session, invoking `on_admitted` with the snapshot while
    /// the session lock is still held.
    ///
    /// The callback is the atomicity hook for join-time broadcasts:
    /// events it enqueues are ordered before anything a concurrently
    /// accepted operation enqueues after the join, so a new joiner's
    /// snapshot precedes every subsequent broadcast it receives.
    pub async fn join_session_with(
        &self,
        session_id: &SessionId,
        user: &UserProfile,
        password: Option<&str>,
        on_admitted: impl FnOnce(&JoinSnapshot),
    ) -> std::result::Result<JoinSnapshot, JoinError> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or(JoinError::SessionNotFound)?;

        // First pass: everything that never suspends. The password
        // hash is cloned out so verification runs without the lock.
        let password_hash = {
            let mut session = handle.lock();

            if let Some(participant) = session.participants.get_mut(&user.user_id) {
                participant.touch();
                let participant = participant.clone();
                let snapshot = JoinSnapshot {
                    participant,
                    participants: session.participant_list(),
                    playback: session.playback.clone(),
                };
                on_admitted(&snapshot);
                return Ok(snapshot);
            }

            Self::admission_checks(&session, &user.user_id)?;
            session.password_hash.clone()
        };

        if let Some(hash) = password_hash {
            let provided = password.ok_or(JoinError::InvalidPassword)?;
            if !verify_password(provided, &hash).await.map_err(JoinError::Engine)? {
                return Err(JoinError::InvalidPassword);
            }
        }

        // Second pass: the session may have filled up or banned the
        // user while the password was being verified.
        let mut session = handle.lock();
        Self::admission_checks(&session, &user.user_id)?;

        let participant = Participant::new(user, Role::Participant);
        session
            .participants
            .insert(user.user_id.clone(), participant.clone());

        info!(
            session_id = %session_id.as_str(),
            user_id = %user.user_id.as_str(),
            participant_count = session.participants.len(),
            "User joined session"
        );

        let snapshot = JoinSnapshot {
            participant,
            participants: session.participant_list(),
            playback: session.playback.clone(),
        };
        on_admitted(&snapshot);
        Ok(snapshot)
    }

    /// Ordered admission checks: capacity, ban list, visibility
    fn admission_checks(
        session: &Session,
        user_id: &UserId,
    ) -> std::result::Result<(), JoinError> {
        if session.is_full() {
            return Err(JoinError::SessionFull);
        }
        if session.is_banned(user_id) {
            return Err(JoinError::UserBanned);
        }
        if session.visibility.is_private() && !session.is_invited(user_id) {
            return Err(JoinError::PrivateSession);
        }
        Ok(())
    }

    /// Remove a participant. Idempotent: leaving a session the caller
    /// is not part of is a no-op. Destroys the session when the last
    /// participant leaves.
    pub fn leave_session(&self, session_id: &SessionId, user_id: &UserId) -> LeaveOutcome {
        let Some(handle) = self.sessions.get(session_id).map(|e| e.value().clone()) else {
            return LeaveOutcome::default();
        };

        let removed = {
            let mut session = handle.lock();
            session.participants.remove(user_id)
        };

        if removed.is_none() {
            return LeaveOutcome::default();
        }

        // Re-checked under the map entry so a concurrent join wins
        // over destruction.
        let destroyed = self
            .sessions
            .remove_if(session_id, |_, s| s.lock().is_empty())
            .is_some();

        if destroyed {
            info!(session_id = %session_id.as_str(), "Session destroyed, last participant left");
        } else {
            debug!(
                session_id = %session_id.as_str(),
                user_id = %user_id.as_str(),
                "User left session"
            );
        }

        LeaveOutcome { removed, destroyed }
    }

    /// Check that a member holds a permission, recording activity on
    /// success.
    pub fn check_permission(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        permission: u64,
        action: &str,
    ) -> Result<()> {
        let handle = self.get(session_id)?;
        let mut session = handle.lock();

        let allowed = session.has_permission(user_id, permission);
        if !allowed {
            return Err(Error::PermissionDenied(action.to_string()));
        }

        if let Some(participant) = session.participants.get_mut(user_id) {
            participant.touch();
        }
        Ok(())
    }

    /// Invite a user to a (private) session
    pub fn invite_user(
        &self,
        session_id: &SessionId,
        caller: &UserId,
        target: UserId,
    ) -> Result<()> {
        self.check_permission(session_id, caller, PermissionBits::INVITE_USER, "invite")?;

        let handle = self.get(session_id)?;
        handle.lock().invited.insert(target);
        Ok(())
    }

    /// Ban a user, removing them from the session if present. Returns
    /// the removed participant so callers can broadcast the removal.
    pub fn ban_user(
        &self,
        session_id: &SessionId,
        caller: &UserId,
        target: &UserId,
    ) -> Result<Option<Participant>> {
        self.check_permission(session_id, caller, PermissionBits::BAN_MEMBER, "ban")?;

        let handle = self.get(session_id)?;
        let mut session = handle.lock();

        if *target == session.host_id {
            return Err(Error::InvalidInput(
                "The session host cannot be banned".to_string(),
            ));
        }

        session.banned.insert(target.clone());
        session.invited.remove(target);
        let removed = session.participants.remove(target);

        info!(
            session_id = %session_id.as_str(),
            user_id = %target.as_str(),
            banned_by = %caller.as_str(),
            "User banned from session"
        );

        Ok(removed)
    }

    /// Explicitly change a participant's role. The host role itself is
    /// not assignable.
    pub fn promote_participant(
        &self,
        session_id: &SessionId,
        caller: &UserId,
        target: &UserId,
        role: Role,
    ) -> Result<Participant> {
        if role == Role::Host {
            return Err(Error::InvalidInput(
                "The host role cannot be assigned".to_string(),
            ));
        }
        self.check_permission(session_id, caller, PermissionBits::MODERATE, "promote")?;

        let handle = self.get(session_id)?;
        let mut session = handle.lock();

        if *target == session.host_id {
            return Err(Error::InvalidInput(
                "The session host's role cannot be changed".to_string(),
            ));
        }

        let participant = session
            .participants
            .get_mut(target)
            .ok_or_else(|| Error::NotFound(format!("Participant {target} not in session")))?;
        participant.promote(role);
        Ok(participant.clone())
    }

    pub fn get(&self, session_id: &SessionId) -> Result<SharedSession> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(format!("Session {session_id} not found")))
    }

    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// IDs of all active sessions
    #[must_use]
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Sessions a user currently participates in
    #[must_use]
    pub fn sessions_of(&self, user_id: &UserId) -> Vec<SessionId> {
        self.sessions
            .iter()
            .filter(|e| e.value().lock().is_member(user_id))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Current participant IDs of a session
    #[must_use]
    pub fn participant_ids(&self, session_id: &SessionId) -> Vec<UserId> {
        self.sessions
            .get(session_id)
            .map(|e| e.value().lock().participants.keys().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn total_participants(&self) -> usize {
        self.sessions
            .iter()
            .map(|e| e.value().lock().participants.len())
            .sum()
    }

    /// Drop all sessions (engine shutdown)
    pub fn clear(&self) {
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchparty_core::models::Visibility;

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(UserId::new(), name)
    }

    async fn create(
        registry: &SessionRegistry,
        host: &UserProfile,
        config: SessionConfig,
    ) -> SessionId {
        registry
            .create_session(host, config, "watchparty")
            .await
            .expect("create session")
            .session_id
    }

    #[tokio::test]
    async fn test_create_session_registers_host() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let creation = registry
            .create_session(&host, SessionConfig::new("movie night", 4), "watchparty")
            .await
            .expect("create");

        assert!(creation.join_url.starts_with("watchparty://join/"));
        assert!(creation
            .join_url
            .ends_with(creation.session_id.as_str()));
        assert_eq!(registry.total_participants(), 1);
    }

    #[tokio::test]
    async fn test_create_session_rejects_empty_name() {
        let registry = SessionRegistry::new();
        let result = registry
            .create_session(&profile("host"), SessionConfig::new("", 4), "watchparty")
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_session() {
        let registry = SessionRegistry::new();
        let result = registry
            .join_session(&SessionId::new(), &profile("user"), None)
            .await;
        assert!(matches!(result, Err(JoinError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_capacity_checked_before_password() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let mut config = SessionConfig::new("full house", 2);
        config.password = Some("hunter2".to_string());
        let session_id = create(&registry, &host, config).await;

        registry
            .join_session(&session_id, &profile("b"), Some("hunter2"))
            .await
            .expect("b joins");

        // Wrong password AND full session: capacity wins.
        let result = registry
            .join_session(&session_id, &profile("c"), Some("wrong"))
            .await;
        assert!(matches!(result, Err(JoinError::SessionFull)));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_join_with_correct_password() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let banned = profile("banned");
        let mut config = SessionConfig::new("vip", 10);
        config.password = Some("hunter2".to_string());
        let session_id = create(&registry, &host, config).await;

        registry
            .get(&session_id)
            .expect("session")
            .lock()
            .banned
            .insert(banned.user_id.clone());

        let result = registry
            .join_session(&session_id, &banned, Some("hunter2"))
            .await;
        assert!(matches!(result, Err(JoinError::UserBanned)));
    }

    #[tokio::test]
    async fn test_private_session_requires_invitation() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let guest = profile("guest");
        let mut config = SessionConfig::new("private", 10);
        config.visibility = Visibility::Private;
        let session_id = create(&registry, &host, config).await;

        let result = registry.join_session(&session_id, &guest, None).await;
        assert!(matches!(result, Err(JoinError::PrivateSession)));

        registry
            .invite_user(&session_id, &host.user_id, guest.user_id.clone())
            .expect("invite");
        let snapshot = registry
            .join_session(&session_id, &guest, None)
            .await
            .expect("join after invite");
        assert_eq!(snapshot.participants.len(), 2);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let mut config = SessionConfig::new("locked", 10);
        config.password = Some("hunter2".to_string());
        let session_id = create(&registry, &host, config).await;

        let result = registry
            .join_session(&session_id, &profile("b"), Some("wrong"))
            .await;
        assert!(matches!(result, Err(JoinError::InvalidPassword)));

        let result = registry.join_session(&session_id, &profile("b"), None).await;
        assert!(matches!(result, Err(JoinError::InvalidPassword)));
    }

    #[tokio::test]
    async fn test_admission_callback_sees_inserted_member() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let user = profile("user");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;

        let mut observed = 0;
        registry
            .join_session_with(&session_id, &user, None, |snapshot| {
                observed = snapshot.participants.len();
                assert!(snapshot
                    .participants
                    .iter()
                    .any(|p| p.user_id == user.user_id));
            })
            .await
            .expect("join");
        assert_eq!(observed, 2);

        // Re-join runs the callback as well.
        let mut called = false;
        registry
            .join_session_with(&session_id, &user, None, |_| called = true)
            .await
            .expect("re-join");
        assert!(called);
    }

    #[tokio::test]
    async fn test_rejoin_is_idempotent() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let user = profile("user");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;

        registry
            .join_session(&session_id, &user, None)
            .await
            .expect("first join");
        let snapshot = registry
            .join_session(&session_id, &user, None)
            .await
            .expect("re-join");

        assert_eq!(snapshot.participants.len(), 2);
        assert_eq!(registry.total_participants(), 2);
    }

    #[tokio::test]
    async fn test_leave_is_idempotent_and_destroys_empty_session() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;

        // Leaving without ever joining is a no-op.
        let outcome = registry.leave_session(&session_id, &UserId::new());
        assert!(outcome.removed.is_none());
        assert!(!outcome.destroyed);

        let outcome = registry.leave_session(&session_id, &host.user_id);
        assert!(outcome.removed.is_some());
        assert!(outcome.destroyed);
        assert!(!registry.contains(&session_id));

        // Second leave after destruction is also a no-op.
        let outcome = registry.leave_session(&session_id, &host.user_id);
        assert!(outcome.removed.is_none());
        assert!(!outcome.destroyed);
    }

    #[tokio::test]
    async fn test_ban_removes_member() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let user = profile("user");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;
        registry
            .join_session(&session_id, &user, None)
            .await
            .expect("join");

        let removed = registry
            .ban_user(&session_id, &host.user_id, &user.user_id)
            .expect("ban");
        assert!(removed.is_some());

        let result = registry.join_session(&session_id, &user, None).await;
        assert!(matches!(result, Err(JoinError::UserBanned)));
    }

    #[tokio::test]
    async fn test_ban_requires_permission() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let user = profile("user");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;
        registry
            .join_session(&session_id, &user, None)
            .await
            .expect("join");

        let result = registry.ban_user(&session_id, &user.user_id, &host.user_id);
        assert!(matches!(result, Err(Error::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn test_promote_takes_effect_immediately() {
        let registry = SessionRegistry::new();
        let host = profile("host");
        let user = profile("user");
        let session_id = create(&registry, &host, SessionConfig::new("test", 10)).await;
        registry
            .join_session(&session_id, &user, None)
            .await
            .expect("join");

        // Participants lack playback control by default.
        assert!(registry
            .check_permission(
                &session_id,
                &user.user_id,
                PermissionBits::PLAYBACK_CONTROL,
                "sync",
            )
            .is_err());

        registry
            .promote_participant(&session_id, &host.user_id, &user.user_id, Role::Moderator)
            .expect("promote");

        assert!(registry
            .check_permission(
                &session_id,
                &user.user_id,
                PermissionBits::PLAYBACK_CONTROL,
                "sync",
            )
            .is_ok());
    }
}
