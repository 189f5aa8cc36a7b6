//! Teardown paths: explicit leave, abrupt disconnect, survivor policy.
//!
//! Explicit leave and transport-level disconnect funnel into the same
//! cleanup, so both produce the identical end state: queue entry removed,
//! room ended exactly once, partner notified once.

use crate::db::audit;
use crate::rooms::EndReason;
use crate::signaling::queue;
use crate::state::AppState;
use crate::ws::protocol::ServerEvent;
use crate::ws::relay;

/// Handle an explicit leave-room request.
pub fn handle_leave_room(room_id: &str, state: &AppState, user_id: &str) {
    match state.rooms.active_members(room_id) {
        None => {
            // Already ended (double-leave race) or never existed; no-op
            tracing::debug!(
                room_id = %room_id,
                user_id = %user_id,
                "Leave for unknown or ended room"
            );
        }
        Some(members) if !members.iter().any(|m| m == user_id) => {
            tracing::warn!(
                room_id = %room_id,
                user_id = %user_id,
                "Leave attempt from non-member dropped"
            );
        }
        Some(_) => end_room(state, room_id, user_id, EndReason::Left),
    }
}

/// Cleanup after the transport reports a closed connection. Produces the
/// same end state as an explicit leave, without trusting the client to
/// have sent one.
pub fn cleanup_disconnect(state: &AppState, user_id: &str) {
    if state.matchmaker.leave(user_id) {
        tracing::debug!(user_id = %user_id, "Removed queue entry on disconnect");
    }

    if let Some(room_id) = state.rooms.active_room_of(user_id) {
        end_room(state, &room_id, user_id, EndReason::Disconnected);
    }
}

/// End whatever active room the user currently occupies. Used for the
/// implicit leave when a roomed user rejoins the queue.
pub fn leave_current_room(state: &AppState, user_id: &str, reason: EndReason) {
    if let Some(room_id) = state.rooms.active_room_of(user_id) {
        end_room(state, &room_id, user_id, reason);
    }
}

/// End a room once, record the audit row, and notify the remaining
/// members. With auto_requeue enabled, a survivor still connected is put
/// straight back into the queue with the ended room's chat type.
fn end_room(state: &AppState, room_id: &str, leaver: &str, reason: EndReason) {
    let Some(room) = state.rooms.end(room_id) else {
        // Another teardown path won the race
        return;
    };

    audit::record_room_ended(&state.db, &room, reason.as_str());

    let event = ServerEvent::UserLeft {
        room_id: room.id.clone(),
    };

    for member in room.members.iter().filter(|m| *m != leaver) {
        relay::send_to_user(&state.connections, member, &event);

        if state.auto_requeue {
            let survivor_tx = state
                .connections
                .get(member)
                .and_then(|conns| conns.value().iter().find(|tx| !tx.is_closed()).cloned());
            if let Some(tx) = survivor_tx {
                tracing::debug!(user_id = %member, "Auto re-queueing stranded user");
                queue::enqueue_user(state, member, room.chat_type, &tx);
            }
        }
    }
}
