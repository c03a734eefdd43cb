use async_trait::async_trait;

use watchparty_core::models::{UserId, UserProfile};
use watchparty_core::Result;

use crate::events::SessionEvent;

/// Outbound message transport.
///
/// Delivery is at-least-once and unacknowledged: events are either
/// idempotent snapshots or monotonic, so duplicates are harmless. The
/// engine never calls this directly from operation handlers; all
/// deliveries flow through the message-processor task.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, user_id: &UserId, event: &SessionEvent) -> Result<()>;
}

/// Identity collaborator resolving the calling user for a request.
///
/// Authentication of the underlying connection is external to the
/// engine.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<UserProfile>;
}
