//! Active room set and lifecycle.
//!
//! Rooms are created already active at the moment of pairing and their
//! status only moves forward: active -> ended, never back. Room ids are
//! UUIDv7 and never reused.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::ws::protocol::ChatType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Active,
    Ended,
}

/// Why a room ended; recorded in the audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Left,
    Disconnected,
    PartnerUnreachable,
}

impl EndReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Left => "left",
            EndReason::Disconnected => "disconnected",
            EndReason::PartnerUnreachable => "partner-unreachable",
        }
    }
}

/// A matched conversation. `members[0]` is the initiator.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub chat_type: ChatType,
    pub members: Vec<String>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Relay volume, flushed into the audit record when the room ends
    pub messages_relayed: u64,
    pub signals_relayed: u64,
}

/// What a relay event counts as.
#[derive(Debug, Clone, Copy)]
pub enum RelayKind {
    Message,
    Signal,
}

/// The set of active rooms plus a user -> room index.
///
/// Ended rooms leave the map entirely (the audit database keeps the
/// durable record), so the `end` race resolves on the map removal: exactly
/// one caller receives the final snapshot, everyone else a no-op.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
    active_by_user: DashMap<String, String>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an active room for the given members (initiator first) and
    /// index them. Pairing consumes both queue entries before this runs, so
    /// members arrive here without an active room.
    pub fn create(&self, members: &[String], chat_type: ChatType) -> Room {
        let room = Room {
            id: Uuid::now_v7().to_string(),
            chat_type,
            members: members.to_vec(),
            status: RoomStatus::Active,
            created_at: Utc::now(),
            ended_at: None,
            messages_relayed: 0,
            signals_relayed: 0,
        };

        for member in members {
            self.active_by_user
                .insert(member.clone(), room.id.clone());
        }
        self.rooms.insert(room.id.clone(), room.clone());

        tracing::info!(
            room_id = %room.id,
            chat_type = %chat_type.as_str(),
            initiator = %members.first().map(String::as_str).unwrap_or(""),
            "Room created"
        );

        room
    }

    /// End a room. Idempotent: only the first caller gets the final
    /// snapshot (status ended, ended_at stamped); later calls and calls
    /// for unknown rooms return None.
    pub fn end(&self, room_id: &str) -> Option<Room> {
        let (_, mut room) = self.rooms.remove(room_id)?;
        room.status = RoomStatus::Ended;
        room.ended_at = Some(Utc::now());

        for member in &room.members {
            // Only clear the index if it still points at this room; the
            // member may already be in a newer room
            self.active_by_user
                .remove_if(member, |_, current| current == room_id);
        }

        tracing::info!(room_id = %room_id, "Room ended");
        Some(room)
    }

    /// Member list of an active room; None when the room is unknown or
    /// already ended. Relay validation goes through this.
    pub fn active_members(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.get(room_id).map(|r| r.members.clone())
    }

    /// The active room a user currently occupies, if any.
    pub fn active_room_of(&self, user_id: &str) -> Option<String> {
        self.active_by_user.get(user_id).map(|r| r.value().clone())
    }

    /// Bump a room's relay counter. No-op for ended/unknown rooms.
    pub fn record_relay(&self, room_id: &str, kind: RelayKind) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            match kind {
                RelayKind::Message => room.messages_relayed += 1,
                RelayKind::Signal => room.signals_relayed += 1,
            }
        }
    }

    /// Number of currently active rooms.
    pub fn active_count(&self) -> usize {
        self.rooms.len()
    }
}
