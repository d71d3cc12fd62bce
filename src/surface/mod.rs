//! Display surfaces: the narrow contract to whatever platform shows the
//! status cards, plus the coordinator that keeps every tracked surface
//! fresh without exceeding its location's push budget.

use crate::error::SurfaceError;
use crate::render::StatusCard;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod console;
pub mod coordinator;
pub mod heartbeat;

pub use console::ConsoleSurface;
pub use coordinator::RefreshCoordinator;
pub use heartbeat::Heartbeat;

/// Opaque id of a place surfaces can be created in (a channel, a pane).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque id of one displayed, addressable rendering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurfaceId(String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of pushing an update to an existing surface.
///
/// `NotFound` means the underlying message disappeared externally: the
/// caller untracks the surface and moves on, it is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Ok,
    NotFound,
    Forbidden,
    RateLimited,
}

/// Contract to the display platform. The chat SDK (or the console, in
/// tests and CLI use) lives behind this.
#[async_trait]
pub trait SurfacePlatform: Send + Sync {
    /// Update an existing surface in place.
    async fn push(&self, surface: &SurfaceId, card: &StatusCard) -> PushOutcome;

    /// Create a fresh surface in a location.
    async fn create(&self, location: &LocationId, card: &StatusCard)
    -> Result<SurfaceId, SurfaceError>;

    /// Remove this bot's previous content from a location, scanning at
    /// most `limit` messages. Returns how many were removed.
    async fn delete_bot_content(
        &self,
        location: &LocationId,
        limit: usize,
    ) -> Result<usize, SurfaceError>;

    /// Whether the most recent message in the location is the bot's own
    /// last push. Used to avoid recreating a surface that is actively
    /// anchoring a conversation.
    async fn last_message_is_own(&self, location: &LocationId) -> Result<bool, SurfaceError>;
}
