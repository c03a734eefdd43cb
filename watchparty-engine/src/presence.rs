use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use watchparty_core::models::{PresenceStatus, UserId, UserProfile};

/// A user currently connected to the engine
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    pub profile: UserProfile,
    pub status: PresenceStatus,
    pub connected_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub latency_ms: Option<u64>,
}

/// Engine-wide presence and connection liveness.
///
/// Tracks every connected user independently of session membership.
/// Users idle past the away threshold are demoted to Away by the
/// periodic refresh; users silent past the liveness timeout show up in
/// `stale_users` for eviction.
pub struct PresenceTracker {
    users: DashMap<UserId, ConnectedUser>,
    away_threshold: Duration,
}

impl PresenceTracker {
    #[must_use]
    pub fn new(away_threshold_secs: u64) -> Self {
        Self {
            users: DashMap::new(),
            away_threshold: Duration::seconds(away_threshold_secs as i64),
        }
    }

    /// Register a connection, resetting any previous record
    pub fn register(&self, profile: UserProfile) {
        let now = Utc::now();
        self.users.insert(
            profile.user_id.clone(),
            ConnectedUser {
                profile,
                status: PresenceStatus::Online,
                connected_at: now,
                last_seen: now,
                latency_ms: None,
            },
        );
    }

    /// Record activity, bringing an Away user back Online
    pub fn mark_active(&self, user_id: &UserId) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.last_seen = Utc::now();
            if user.status == PresenceStatus::Away {
                user.status = PresenceStatus::Online;
            }
        }
    }

    /// Explicitly set a user's status (also counts as activity)
    pub fn set_status(&self, user_id: &UserId, status: PresenceStatus) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.status = status;
            user.last_seen = Utc::now();
        }
    }

    /// Store the latest round-trip latency sample
    pub fn record_latency(&self, user_id: &UserId, latency_ms: u64) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.latency_ms = Some(latency_ms);
            user.last_seen = Utc::now();
        }
    }

    /// Demote idle Online users to Away. Explicit Busy/Offline
    /// statuses are left alone.
    pub fn refresh_statuses(&self) {
        let cutoff = Utc::now() - self.away_threshold;
        for mut user in self.users.iter_mut() {
            if user.status == PresenceStatus::Online && user.last_seen < cutoff {
                debug!(user_id = %user.profile.user_id.as_str(), "User marked away");
                user.status = PresenceStatus::Away;
            }
        }
    }

    /// Users silent longer than `timeout_secs`, candidates for
    /// eviction
    #[must_use]
    pub fn stale_users(&self, timeout_secs: u64) -> Vec<UserId> {
        let cutoff = Utc::now() - Duration::seconds(timeout_secs as i64);
        self.users
            .iter()
            .filter(|e| e.value().last_seen < cutoff)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn remove(&self, user_id: &UserId) -> Option<ConnectedUser> {
        self.users.remove(user_id).map(|(_, user)| user)
    }

    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<ConnectedUser> {
        self.users.get(user_id).map(|e| e.value().clone())
    }

    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.users.len()
    }

    /// Mean of the latest latency samples, None when nobody has one
    #[must_use]
    pub fn average_latency_ms(&self) -> Option<f64> {
        let samples: Vec<u64> = self
            .users
            .iter()
            .filter_map(|e| e.value().latency_ms)
            .collect();
        if samples.is_empty() {
            return None;
        }
        Some(samples.iter().sum::<u64>() as f64 / samples.len() as f64)
    }

    pub fn clear(&self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> UserProfile {
        UserProfile::new(UserId::new(), name)
    }

    #[test]
    fn test_register_and_activity() {
        let tracker = PresenceTracker::new(60);
        let user = profile("a");
        tracker.register(user.clone());

        assert_eq!(tracker.connected_count(), 1);
        let connected = tracker.get(&user.user_id).expect("registered");
        assert_eq!(connected.status, PresenceStatus::Online);
    }

    #[test]
    fn test_idle_user_marked_away_and_recovers() {
        let tracker = PresenceTracker::new(60);
        let user = profile("a");
        tracker.register(user.clone());

        // Simulate an idle user by back-dating last_seen.
        tracker
            .users
            .get_mut(&user.user_id)
            .expect("registered")
            .last_seen = Utc::now() - Duration::seconds(120);

        tracker.refresh_statuses();
        assert_eq!(
            tracker.get(&user.user_id).expect("user").status,
            PresenceStatus::Away
        );

        tracker.mark_active(&user.user_id);
        assert_eq!(
            tracker.get(&user.user_id).expect("user").status,
            PresenceStatus::Online
        );
    }

    #[test]
    fn test_explicit_busy_not_demoted() {
        let tracker = PresenceTracker::new(60);
        let user = profile("a");
        tracker.register(user.clone());
        tracker.set_status(&user.user_id, PresenceStatus::Busy);

        tracker
            .users
            .get_mut(&user.user_id)
            .expect("registered")
            .last_seen = Utc::now() - Duration::seconds(120);

        tracker.refresh_statuses();
        assert_eq!(
            tracker.get(&user.user_id).expect("user").status,
            PresenceStatus::Busy
        );
    }

    #[test]
    fn test_stale_users_detected() {
        let tracker = PresenceTracker::new(60);
        let fresh = profile("fresh");
        let stale = profile("stale");
        tracker.register(fresh.clone());
        tracker.register(stale.clone());

        tracker
            .users
            .get_mut(&stale.user_id)
            .expect("registered")
            .last_seen = Utc::now() - Duration::seconds(45);

        let stale_ids = tracker.stale_users(30);
        assert_eq!(stale_ids, vec![stale.user_id]);
    }

    #[test]
    fn test_average_latency() {
        let tracker = PresenceTracker::new(60);
        assert!(tracker.average_latency_ms().is_none());

        let a = profile("a");
        let b = profile("b");
        tracker.register(a.clone());
        tracker.register(b.clone());
        tracker.record_latency(&a.user_id, 40);
        tracker.record_latency(&b.user_id, 80);

        assert_eq!(tracker.average_latency_ms(), Some(60.0));
    }
}
