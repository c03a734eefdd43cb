use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use watchparty_core::models::{
    PermissionBits, PlaylistId, PlaylistVideo, SessionId, SharedPlaylist, UserId,
};
use watchparty_core::{Error, Result};

use crate::dispatch::BroadcastDispatcher;
use crate::events::SessionEvent;
use crate::registry::SessionRegistry;

/// Shared playlists, keyed by playlist rather than session.
///
/// Playlists outlive their session: when a session is destroyed its
/// playlists stay addressable, but only the creator may still edit
/// them. Edit broadcasts are enqueued under the playlist lock, and
/// edits to orphaned playlists are silent.
pub struct PlaylistCoordinator {
    registry: SessionRegistry,
    dispatcher: BroadcastDispatcher,
    playlists: DashMap<PlaylistId, Arc<Mutex<SharedPlaylist>>>,
}

impl PlaylistCoordinator {
    #[must_use]
    pub fn new(registry: SessionRegistry, dispatcher: BroadcastDispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            playlists: DashMap::new(),
        }
    }

    /// Create a playlist in a live session
    pub fn create(
        &self,
        session_id: &SessionId,
        user_id: &UserId,
        name: String,
        videos: Vec<PlaylistVideo>,
        collaborative: bool,
    ) -> Result<SharedPlaylist> {
        if name.is_empty() {
            return Err(Error::InvalidInput("Playlist name cannot be empty".to_string()));
        }
        self.registry.check_permission(
            session_id,
            user_id,
            PermissionBits::MANAGE_PLAYLIST,
            "create playlist",
        )?;

        let playlist = SharedPlaylist::new(
            session_id.clone(),
            user_id.clone(),
            name,
            videos,
            collaborative,
        );

        self.playlists.insert(
            playlist.id.clone(),
            Arc::new(Mutex::new(playlist.clone())),
        );
        self.dispatcher.broadcast(
            session_id.clone(),
            SessionEvent::PlaylistCreated {
                session_id: session_id.clone(),
                playlist: playlist.clone(),
                timestamp: Utc::now(),
            },
        );

        info!(
            session_id = %session_id.as_str(),
            playlist_id = %playlist.id.as_str(),
            video_count = playlist.len(),
            "Playlist created"
        );

        Ok(playlist)
    }

    /// Append a video, re-checking the caller's rights against the
    /// owning session at edit time.
    ///
    /// Returns the owning session ID alongside the updated snapshot so
    /// the caller knows where to broadcast.
    pub fn add_video(
        &self,
        playlist_id: &PlaylistId,
        user_id: &UserId,
        video: PlaylistVideo,
    ) -> Result<(SessionId, SharedPlaylist)> {
        let handle = self
            .playlists
            .get(playlist_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("Playlist {playlist_id} not found")))?;

        let mut playlist = handle.lock();
        self.check_edit_rights(&playlist, user_id)?;

        playlist.add_video(video.clone());
        if self.registry.contains(&playlist.session_id) {
            self.dispatcher.broadcast(
                playlist.session_id.clone(),
                SessionEvent::VideoAddedToPlaylist {
                    session_id: playlist.session_id.clone(),
                    playlist_id: playlist_id.clone(),
                    video,
                    added_by: user_id.clone(),
                    timestamp: Utc::now(),
                },
            );
        }

        debug!(
            playlist_id = %playlist_id.as_str(),
            user_id = %user_id.as_str(),
            video_count = playlist.len(),
            "Video added to playlist"
        );

        Ok((playlist.session_id.clone(), playlist.clone()))
    }

    fn check_edit_rights(&self, playlist: &SharedPlaylist, user_id: &UserId) -> Result<()> {
        // Orphaned playlist: session gone, creator keeps edit rights.
        if !self.registry.contains(&playlist.session_id) {
            if playlist.creator_id == *user_id {
                return Ok(());
            }
            return Err(Error::PermissionDenied(
                "Only the creator may edit an orphaned playlist".to_string(),
            ));
        }

        if !playlist.collaborative && playlist.creator_id != *user_id {
            return Err(Error::PermissionDenied(
                "Playlist is not collaborative".to_string(),
            ));
        }

        self.registry.check_permission(
            &playlist.session_id,
            user_id,
            PermissionBits::MANAGE_PLAYLIST,
            "edit playlist",
        )
    }

    pub fn get(&self, playlist_id: &PlaylistId) -> Result<SharedPlaylist> {
        self.playlists
            .get(playlist_id)
            .map(|e| e.value().lock().clone())
            .ok_or_else(|| Error::NotFound(format!("Playlist {playlist_id} not found")))
    }

    /// Playlists created in a session, live or destroyed
    #[must_use]
    pub fn for_session(&self, session_id: &SessionId) -> Vec<SharedPlaylist> {
        self.playlists
            .iter()
            .map(|e| e.value().lock().clone())
            .filter(|p| p.session_id == *session_id)
            .collect()
    }

    #[must_use]
    pub fn playlist_count(&self) -> usize {
        self.playlists.len()
    }

    pub fn clear(&self) {
        self.playlists.clear();
    }
}
