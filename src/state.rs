use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::DbPool;
use crate::matchmaking::Matchmaker;
use crate::rooms::RoomRegistry;
use crate::ws::ConnectionRegistry;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Room lifecycle audit database
    pub db: DbPool,
    /// JWT signing secret shared with the identity provider
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Waiting pool and pairing logic
    pub matchmaker: Arc<Matchmaker>,
    /// Active rooms and the user -> room index
    pub rooms: Arc<RoomRegistry>,
    /// Refuse guest connections when true
    pub disable_guests: bool,
    /// Re-queue a stranded user when their partner leaves
    pub auto_requeue: bool,
    /// Optional cap on queue wait before a queue-timeout notification
    pub queue_timeout_secs: Option<u64>,
    /// Process start time, for the status endpoint
    pub started_at: DateTime<Utc>,
}
