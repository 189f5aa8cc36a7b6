use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking; no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![M::up(
        "-- Migration 1: Room lifecycle audit record
--
-- One row per matched room. Relay volume is counted in memory and flushed
-- when the room ends. Message content is never stored.

CREATE TABLE rooms (
    id TEXT PRIMARY KEY,
    chat_type TEXT NOT NULL,
    initiator_id TEXT NOT NULL,
    responder_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    ended_at TEXT,
    end_reason TEXT,
    messages_relayed INTEGER NOT NULL DEFAULT 0,
    signals_relayed INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_rooms_created ON rooms(created_at);
",
    )])
}
