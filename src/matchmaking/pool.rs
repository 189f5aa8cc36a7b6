//! Waiting pool: the set of not-yet-matched queue entries.
//!
//! All mutations and the compatible-partner scan run under one mutex, so
//! enqueue+match is a single critical section. Two concurrent join-queue
//! calls can never both claim the same waiter, and a user can never hold
//! two entries at once.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::ws::protocol::ChatType;
use crate::ws::ConnectionSender;

/// A pending match request.
#[derive(Debug)]
pub struct QueueEntry {
    /// Distinguishes this enqueue from later re-enqueues by the same user,
    /// so a timeout sweep never removes a newer entry
    pub entry_id: Uuid,
    pub user_id: String,
    pub chat_type: ChatType,
    pub queued_at: DateTime<Utc>,
    /// Handle to notify the waiter; a closed sender marks a dead waiter
    pub tx: ConnectionSender,
}

impl QueueEntry {
    pub fn new(user_id: String, chat_type: ChatType, tx: ConnectionSender) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            user_id,
            chat_type,
            queued_at: Utc::now(),
            tx,
        }
    }
}

/// Result of `pair_or_enqueue`.
#[derive(Debug)]
pub enum PairOutcome {
    /// A compatible live waiter was found and removed from the pool
    Matched(QueueEntry),
    /// No compatible waiter; the caller's entry was inserted
    Queued { entry_id: Uuid },
}

/// FIFO pool of queue entries, earliest waiter first.
#[derive(Debug, Default)]
pub struct WaitingPool {
    entries: Mutex<Vec<QueueEntry>>,
}

impl WaitingPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically: drop any stale entry for the caller, scan for the first
    /// compatible live waiter, and either remove that waiter (match) or
    /// insert the caller's entry (queue).
    ///
    /// Waiters whose connection has closed are evicted during the scan
    /// instead of being matched; this resolves the disconnect race where a
    /// waiter dies between queueing and being picked, without ever looping
    /// beyond one pool traversal.
    pub fn pair_or_enqueue(&self, entry: QueueEntry) -> PairOutcome {
        let mut entries = self.entries.lock().expect("waiting pool lock");

        // At-most-one entry per user: replace any stale entry first
        entries.retain(|e| e.user_id != entry.user_id);

        let mut i = 0;
        while i < entries.len() {
            let candidate = &entries[i];
            // A user is never paired with themselves, even across two
            // connections sharing one identifier
            if candidate.user_id == entry.user_id
                || !candidate.chat_type.compatible_with(entry.chat_type)
            {
                i += 1;
                continue;
            }
            if candidate.tx.is_closed() {
                tracing::debug!(
                    user_id = %candidate.user_id,
                    "Evicting dead waiter from pool"
                );
                entries.remove(i);
                continue;
            }
            return PairOutcome::Matched(entries.remove(i));
        }

        let entry_id = entry.entry_id;
        entries.push(entry);
        PairOutcome::Queued { entry_id }
    }

    /// Insert an entry without attempting a match, replacing any stale
    /// entry for the same user. Returns the entry id for timeout sweeps.
    pub fn enqueue(&self, entry: QueueEntry) -> Uuid {
        let mut entries = self.entries.lock().expect("waiting pool lock");
        entries.retain(|e| e.user_id != entry.user_id);
        let entry_id = entry.entry_id;
        entries.push(entry);
        entry_id
    }

    /// Remove a user's entry if present. Not an error when absent:
    /// disconnect-before-match is a normal race.
    pub fn dequeue(&self, user_id: &str) -> Option<QueueEntry> {
        let mut entries = self.entries.lock().expect("waiting pool lock");
        let pos = entries.iter().position(|e| e.user_id == user_id)?;
        Some(entries.remove(pos))
    }

    /// Remove a specific enqueue, identified by its entry id. Used by the
    /// queue-timeout sweep so it cannot cancel a newer entry the user made
    /// after re-queueing.
    pub fn remove_entry(&self, user_id: &str, entry_id: Uuid) -> bool {
        let mut entries = self.entries.lock().expect("waiting pool lock");
        let before = entries.len();
        entries.retain(|e| !(e.user_id == user_id && e.entry_id == entry_id));
        entries.len() < before
    }

    /// Current queue depth.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("waiting pool lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
