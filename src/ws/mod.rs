pub mod actor;
pub mod handler;
pub mod protocol;
pub mod relay;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system clone this to push messages to a specific
/// client; a closed sender means the connection is gone.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: all active WebSocket connections per user.
/// Guest ids are minted per connection, but a token user can hold several
/// concurrent connections (multiple tabs/devices).
pub type ConnectionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}
