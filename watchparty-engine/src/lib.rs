//! Collaborative-session synchronization engine.
//!
//! Single-process, in-memory engine that lets multiple clients jointly
//! watch a video: server-authoritative playback sync, chat and
//! timestamped annotations, voice/screen-share sub-sessions, shared
//! playlists, presence tracking, and ordered broadcast fan-out through
//! an abstract transport.

pub mod calls;
pub mod dispatch;
pub mod engine;
pub mod events;
pub mod messaging;
pub mod playback;
pub mod playlists;
pub mod presence;
pub mod registry;
pub mod transport;

pub use dispatch::{BroadcastDispatcher, Envelope, Scope};
pub use engine::{CollaborationEngine, CollaborationStats};
pub use events::SessionEvent;
pub use registry::{JoinError, JoinSnapshot, SessionCreation, SessionRegistry};
pub use transport::{IdentityProvider, Transport};
