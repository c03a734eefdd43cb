use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use watchparty_core::models::{
    PermissionBits, ScreenShare, SessionId, ShareConfig, UserId, VoiceCall,
};
use watchparty_core::{Error, Result};

use crate::dispatch::BroadcastDispatcher;
use crate::events::SessionEvent;
use crate::registry::SessionRegistry;

#[derive(Default)]
struct SessionCalls {
    voice: Vec<VoiceCall>,
    shares: Vec<ScreenShare>,
}

/// Voice calls and screen shares within sessions.
///
/// Calls are sub-sessions: several can coexist in one session, each
/// ends when its last participant leaves, and a member can run at
/// most one screen share at a time. Lifecycle broadcasts are enqueued
/// under the per-session call lock so they cannot reorder against the
/// mutations they announce.
pub struct CallCoordinator {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    calls: DashMap<SessionId, Arc<Mutex<SessionCalls>>>,
}

impl CallCoordinator {
    #[must_use]
    pub fn new(registry: SessionRegistry, dispatcher: BroadcastDispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            calls: DashMap::new(),
        }
    }

    fn entry(&self, session_id: &SessionId) -> Arc<Mutex<SessionCalls>> {
        self.calls
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(SessionCalls::default())))
            .clone()
    }

    /// Start a voice call. With no explicit invitees the whole current
    /// roster is pulled in; invitee lists are filtered to members.
    pub fn start_voice_call(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        invitees: Option<Vec<UserId>>,
    ) -> Result<VoiceCall> {
        self.registry.check_permission(
            session_id,
            user_id,
            PermissionBits::VOICE_CALL,
            "start voice call",
        )?;

        let members: HashSet<UserId> = self
            .registry
            .participant_ids(session_id)
            .into_iter()
            .collect();
        let mut participants: HashSet<UserId> = match invitees {
            Some(list) => list.into_iter().filter(|u| members.contains(u)).collect(),
            None => members,
        };
        participants.insert(user_id.clone());

        let call = VoiceCall::new(session_id.clone(), user_id.clone(), participants);

        let entry = self.entry(session_id);
        {
            let mut calls = entry.lock();
            calls.voice.push(call.clone());
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::VoiceCallStarted {
                    session_id: session_id.clone(),
                    call: call.clone(),
                    timestamp: Utc::now(),
                },
            );
        }

        info!(
            session_id = %session_id.as_str(),
            call_id = %call.id,
            participant_count = call.participants.len(),
            "Voice call started"
        );

        Ok(call)
    }

    /// Leave a voice call. Idempotent. Returns the call when leaving
    /// emptied and therefore ended it.
    pub fn leave_voice_call(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        call_id: &str,
    ) -> Option<VoiceCall> {
        let entry = self.calls.get(session_id).map(|e| e.value().clone())?;
        let mut calls = entry.lock();

        let index = calls.voice.iter().position(|c| c.id == call_id)?;
        if calls.voice[index].remove_participant(user_id) {
            let mut call = calls.voice.remove(index);
            call.active = false;
            self.dispatcher.broadcast(
                session_id.clone(),
                SessionEvent::VoiceCallEnded {
                    session_id: session_id.clone(),
                    call_id: call.id.clone(),
                    timestamp: Utc::now(),
                },
            );
            info!(
                session_id = %session_id.as_str(),
                call_id = %call.id,
                "Voice call ended, last participant left"
            );
            return Some(call);
        }
        None
    }

    /// Start a screen share. A sharer can only run one at a time.
    pub fn start_screen_share(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        config: ShareConfig,
    ) -> Result<ScreenShare> {
        self.registry.check_permission(
            session_id,
            user_id,
            PermissionBits::SCREEN_SHARE,
            "start screen share",
        )?;

        let entry = self.entry(session_id);
        let mut calls = entry.lock();

        if calls.shares.iter().any(|s| s.sharer_id == *user_id) {
            return Err(Error::AlreadyExists(
                "User is already sharing their screen".to_string(),
            ));
        }

        let share = ScreenShare::new(session_id.clone(), user_id.clone(), config);
        calls.shares.push(share.clone());
        self.dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::ScreenShareStarted {
                session_id: session_id.clone(),
                share: share.clone(),
                timestamp: Utc::now(),
            },
        );

        info!(
            session_id = %session_id.as_str(),
            share_id = %share.id,
            user_id = %user_id.as_str(),
            "Screen share started"
        );

        Ok(share)
    }

    /// Stop a screen share. Idempotent; only the sharer's own share is
    /// matched.
    pub fn stop_screen_share(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        share_id: &str,
    ) -> Option<ScreenShare> {
        let entry = self.calls.get(session_id).map(|e| e.value().clone())?;
        let mut calls = entry.lock();

        let index = calls
            .shares
            .iter()
            .position(|s| s.id == share_id && s.sharer_id == *user_id)?;
        let mut share = calls.shares.remove(index);
        share.active = false;
        self.dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::ScreenShareStopped {
                session_id: session_id.clone(),
                share_id: share.id.clone(),
                sharer_id: share.sharer_id.clone(),
                timestamp: Utc::now(),
            },
        );

        debug!(
            session_id = %session_id.as_str(),
            share_id = %share.id,
            "Screen share stopped"
        );

        Some(share)
    }

    /// Pull a departing user out of every call and share in a session.
    /// Returns the calls that ended and the shares that stopped.
    pub fn end_for_user(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
    ) -> (Vec<VoiceCall>, Vec<ScreenShare>) {
        let Some(entry) = self.calls.get(session_id).map(|e| e.value().clone()) else {
            return (Vec::new(), Vec::new());
        };
        let mut calls = entry.lock();

        let mut ended = Vec::new();
        let mut i = 0;
        while i < calls.voice.len() {
            if calls.voice[i].remove_participant(user_id) {
                let mut call = calls.voice.remove(i);
                call.active = false;
                self.dispatcher.broadcast(
                    session_id.clone(),
                    SessionEvent::VoiceCallEnded {
                        session_id: session_id.clone(),
                        call_id: call.id.clone(),
                        timestamp: Utc::now(),
                    },
                );
                ended.push(call);
            } else {
                i += 1;
            }
        }

        let mut stopped = Vec::new();
        let mut i = 0;
        while i < calls.shares.len() {
            if calls.shares[i].sharer_id == *user_id {
                let mut share = calls.shares.remove(i);
                share.active = false;
                self.dispatcher.broadcast(
                    session_id.clone(),
                    SessionEvent::ScreenShareStopped {
                        session_id: session_id.clone(),
                        share_id: share.id.clone(),
                        sharer_id: share.sharer_id.clone(),
                        timestamp: Utc::now(),
                    },
                );
                stopped.push(share);
            } else {
                i += 1;
            }
        }

        (ended, stopped)
    }

    /// Drop all call state for a destroyed session
    pub fn remove_session(&self, session_id: &SessionId) {
        self.calls.remove(session_id);
    }

    #[must_use]
    pub fn active_calls(&self, session_id: &SessionId) -> Vec<VoiceCall> {
        self.calls
            .get(session_id)
            .map(|e| e.value().lock().voice.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn active_shares(&self, session_id: &SessionId) -> Vec<ScreenShare> {
        self.calls
            .get(session_id)
            .map(|e| e.value().lock().shares.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn total_active_calls(&self) -> usize {
        self.calls.iter().map(|e| e.value().lock().voice.len()).sum()
    }

    #[must_use]
    pub fn total_active_shares(&self) -> usize {
        self.calls
            .iter()
            .map(|e| e.value().lock().shares.len())
            .sum()
    }

    /// Drop all call state (engine shutdown)
    pub fn clear(&self) {
        self.calls.clear();
    }
}
