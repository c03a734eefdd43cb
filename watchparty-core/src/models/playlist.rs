use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{PlaylistId, SessionId, UserId};

/// A single entry in a shared playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistVideo {
    pub url: String,
    pub title: String,
    pub duration_secs: Option<f64>,
}

/// A collaboratively editable ordered video list.
///
/// A playlist back-references the session it was created in but has an
/// independent lifetime: it survives destruction of that session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPlaylist {
    pub id: PlaylistId,
    pub session_id: SessionId,
    pub creator_id: UserId,
    pub name: String,
    pub videos: Vec<PlaylistVideo>,
    pub current_index: usize,
    /// When false, only the creator may edit the playlist
    pub collaborative: bool,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl SharedPlaylist {
    pub fn new(
        session_id: SessionId,
        creator_id: UserId,
        name: String,
        videos: Vec<PlaylistVideo>,
        collaborative: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PlaylistId::new(),
            session_id,
            creator_id,
            name,
            videos,
            current_index: 0,
            collaborative,
            created_at: now,
            last_modified: now,
        }
    }

    pub fn add_video(&mut self, video: PlaylistVideo) {
        self.videos.push(video);
        self.last_modified = Utc::now();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.videos.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_video_updates_last_modified() {
        let mut playlist = SharedPlaylist::new(
            SessionId::new(),
            UserId::new(),
            "movie night".to_string(),
            vec![],
            true,
        );
        let before = playlist.last_modified;

        playlist.add_video(PlaylistVideo {
            url: "https://example.com/a.mp4".to_string(),
            title: "A".to_string(),
            duration_secs: Some(120.0),
        });

        assert_eq!(playlist.len(), 1);
        assert!(playlist.last_modified >= before);
    }
}
