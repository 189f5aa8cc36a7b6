//! At-most-once durable record of room lifecycle and relay volume.
//! Relay correctness never depends on these writes; failures are logged
//! and absorbed.

use crate::db::DbPool;
use crate::rooms::registry::Room;

/// Record a freshly created room. Fire-and-forget via spawn_blocking.
pub fn record_room_created(db: &DbPool, room: &Room) {
    let db = db.clone();
    let id = room.id.clone();
    let chat_type = room.chat_type.as_str().to_string();
    let initiator = room.members.first().cloned().unwrap_or_default();
    let responder = room.members.get(1).cloned().unwrap_or_default();
    let created_at = room.created_at.to_rfc3339();

    tokio::task::spawn_blocking(move || {
        let result = (|| -> Result<(), rusqlite::Error> {
            let conn = match db.lock() {
                Ok(conn) => conn,
                Err(_) => return Ok(()),
            };
            conn.execute(
                "INSERT OR IGNORE INTO rooms (id, chat_type, initiator_id, responder_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, chat_type, initiator, responder, created_at],
            )?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record room creation");
        }
    });
}

/// Record a room's end. The `ended_at IS NULL` guard keeps the end record
/// at-most-once even if double-leave races both reach this point.
pub fn record_room_ended(db: &DbPool, room: &Room, reason: &'static str) {
    let db = db.clone();
    let id = room.id.clone();
    let ended_at = room
        .ended_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
    let messages = room.messages_relayed as i64;
    let signals = room.signals_relayed as i64;

    tokio::task::spawn_blocking(move || {
        let result = (|| -> Result<(), rusqlite::Error> {
            let conn = match db.lock() {
                Ok(conn) => conn,
                Err(_) => return Ok(()),
            };
            conn.execute(
                "UPDATE rooms
                 SET ended_at = ?1, end_reason = ?2, messages_relayed = ?3, signals_relayed = ?4
                 WHERE id = ?5 AND ended_at IS NULL",
                rusqlite::params![ended_at, reason, messages, signals, id],
            )?;
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to record room end");
        }
    });
}
