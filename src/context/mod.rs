//! Context collaborators — auxiliary lookups consulted before a decision.
//!
//! A room lookup is best-effort by contract: an outage here degrades the
//! decision context to "unavailable" but must never deny an otherwise
//! valid request. That is the opposite of the reasoning provider, whose
//! outage does deny.

mod ha;

pub use ha::HomeAssistant;

use async_trait::async_trait;

/// Resolves which room a device is currently in.
#[async_trait]
pub trait RoomProvider: Send + Sync {
    /// The room name, or None when the provider cannot say.
    async fn device_room(&self, device_ip: &str) -> Option<String>;
}

/// Provider used when no location integration is configured.
pub struct NoRooms;

#[async_trait]
impl RoomProvider for NoRooms {
    async fn device_room(&self, _device_ip: &str) -> Option<String> {
        None
    }
}
