//! Pairing: one atomic pool step, then room creation.

use crate::matchmaking::pool::{PairOutcome, QueueEntry, WaitingPool};
use crate::rooms::registry::{Room, RoomRegistry};
use crate::ws::protocol::ChatType;
use uuid::Uuid;

/// Outcome of a join-queue request.
#[derive(Debug)]
pub enum JoinOutcome {
    /// No compatible waiter; the caller stays queued
    Queued { entry_id: Uuid },
    /// Paired. The caller triggered the match and is the initiator
    /// (`members[0]` of the room); `partner` is the consumed pool entry,
    /// still carrying the handle needed to notify them.
    Matched { room: Room, partner: QueueEntry },
}

/// Owns the waiting pool and drives pairing against the room registry.
#[derive(Debug, Default)]
pub struct Matchmaker {
    pool: WaitingPool,
}

impl Matchmaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a join-queue request. The earliest compatible live waiter is
    /// consumed and an active room is created with the caller designated
    /// initiator; otherwise the caller is queued.
    ///
    /// The negotiated chat type is the specific medium when one side held
    /// the wildcard, and the common type otherwise.
    pub fn join(&self, rooms: &RoomRegistry, entry: QueueEntry) -> JoinOutcome {
        let caller_id = entry.user_id.clone();
        let caller_type = entry.chat_type;

        match self.pool.pair_or_enqueue(entry) {
            PairOutcome::Queued { entry_id } => JoinOutcome::Queued { entry_id },
            PairOutcome::Matched(partner) => {
                let chat_type = negotiate(caller_type, partner.chat_type);
                let room = rooms.create(&[caller_id, partner.user_id.clone()], chat_type);
                JoinOutcome::Matched { room, partner }
            }
        }
    }

    /// Remove the user's pending entry, if any.
    pub fn leave(&self, user_id: &str) -> bool {
        self.pool.dequeue(user_id).is_some()
    }

    pub fn pool(&self) -> &WaitingPool {
        &self.pool
    }
}

/// Pick the room's chat type from two compatible requests: the specific
/// side wins over the wildcard.
fn negotiate(a: ChatType, b: ChatType) -> ChatType {
    if a == ChatType::Both {
        b
    } else {
        a
    }
}
