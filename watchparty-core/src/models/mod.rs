pub mod call;
pub mod chat;
pub mod id;
pub mod participant;
pub mod permission;
pub mod playback;
pub mod playlist;
pub mod session;
pub mod user;

pub use call::{ScreenShare, ShareConfig, ShareQuality, VoiceCall};
pub use chat::{
    Annotation, AnnotationData, AnnotationKind, AnnotationReply, ChatMessage, MessageKind,
    ScreenPosition,
};
pub use id::{generate_id, PlaylistId, SessionId, UserId};
pub use participant::{Participant, PresenceStatus};
pub use permission::{PermissionBits, PermissionOverrides, Role};
pub use playback::{PlaybackState, SyncState};
pub use playlist::{PlaylistVideo, SharedPlaylist};
pub use session::{Session, SessionConfig, Visibility};
pub use user::UserProfile;
