//! join-queue handling: enqueue-or-match, match notification, rollback.

use std::time::Duration;

use crate::db::audit;
use crate::matchmaking::{JoinOutcome, QueueEntry};
use crate::rooms::EndReason;
use crate::signaling::lifecycle;
use crate::state::AppState;
use crate::ws::protocol::{ChatType, ServerEvent};
use crate::ws::{relay, ConnectionSender};

/// Handle a join-queue request.
///
/// Joining while inside an active room is an implicit leave of that room
/// (a user occupies at most one active room); joining while already queued
/// replaces the old entry, so repeated requests are safe.
pub fn handle_join_queue(
    chat_type: ChatType,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
) {
    lifecycle::leave_current_room(state, user_id, EndReason::Left);
    enqueue_user(state, user_id, chat_type, tx);
}

/// Enqueue a user, pairing immediately when a compatible waiter exists.
///
/// The pool already refuses to match waiters whose connection has closed,
/// so a match-then-unreachable partner is a razor-thin race; when it does
/// happen the room is rolled back and pairing is retried once before the
/// caller falls back to plain waiting.
pub fn enqueue_user(state: &AppState, user_id: &str, chat_type: ChatType, tx: &ConnectionSender) {
    let mut attempts = 0;
    loop {
        let entry = QueueEntry::new(user_id.to_string(), chat_type, tx.clone());

        if attempts >= 2 {
            // Two dead partners in a row: stop matching, just wait
            let entry_id = state.matchmaker.pool().enqueue(entry);
            ack_queued(state, user_id, chat_type, tx, entry_id);
            return;
        }

        match state.matchmaker.join(&state.rooms, entry) {
            JoinOutcome::Queued { entry_id } => {
                ack_queued(state, user_id, chat_type, tx, entry_id);
                return;
            }
            JoinOutcome::Matched { room, partner } => {
                audit::record_room_created(&state.db, &room);

                // Notify the partner first: if their connection died inside
                // the pairing window, the room is rolled back before the
                // caller ever hears about it.
                let delivered = relay::try_send_to_conn(
                    &partner.tx,
                    &ServerEvent::MatchFound {
                        room_id: room.id.clone(),
                        chat_type: room.chat_type,
                        is_initiator: false,
                    },
                );

                if !delivered {
                    tracing::warn!(
                        room_id = %room.id,
                        partner = %partner.user_id,
                        "Matched partner unreachable, rolling back"
                    );
                    if let Some(ended) = state.rooms.end(&room.id) {
                        audit::record_room_ended(
                            &state.db,
                            &ended,
                            EndReason::PartnerUnreachable.as_str(),
                        );
                    }
                    attempts += 1;
                    continue;
                }

                relay::send_to_conn(
                    tx,
                    &ServerEvent::MatchFound {
                        room_id: room.id.clone(),
                        chat_type: room.chat_type,
                        is_initiator: true,
                    },
                );

                tracing::info!(
                    room_id = %room.id,
                    initiator = %user_id,
                    responder = %partner.user_id,
                    "Match found"
                );
                return;
            }
        }
    }
}

/// Acknowledge the waiting state and arm the optional queue timeout.
fn ack_queued(
    state: &AppState,
    user_id: &str,
    chat_type: ChatType,
    tx: &ConnectionSender,
    entry_id: uuid::Uuid,
) {
    relay::send_to_conn(tx, &ServerEvent::Queued { chat_type });

    if let Some(secs) = state.queue_timeout_secs {
        let state = state.clone();
        let user_id = user_id.to_string();
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            // Only this exact enqueue is cancelled; a newer entry by the
            // same user has a different entry id and is left alone
            if state.matchmaker.pool().remove_entry(&user_id, entry_id) {
                tracing::debug!(user_id = %user_id, "Queue wait timed out");
                relay::send_to_conn(&tx, &ServerEvent::QueueTimeout);
            }
        });
    }
}
