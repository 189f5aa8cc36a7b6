//! In-room relay: chat messages and WebRTC negotiation payloads.
//!
//! The relay is a dumb pipe. Payloads pass through untouched; the only
//! inspection is the routing metadata (room id, optional target). A sender
//! must be a current member of the room it relays into; violations are
//! logged and the payload dropped, the connection stays alive.

use chrono::Utc;

use crate::rooms::registry::RelayKind;
use crate::state::AppState;
use crate::ws::protocol::{MessageType, ServerEvent};
use crate::ws::relay;

/// Relay a chat message to the other members of the room.
pub fn handle_send_message(
    room_id: &str,
    message: String,
    message_type: MessageType,
    state: &AppState,
    user_id: &str,
) {
    let Some(members) = validate_sender(state, room_id, user_id) else {
        return;
    };

    state.rooms.record_relay(room_id, RelayKind::Message);

    let event = ServerEvent::NewMessage {
        room_id: room_id.to_string(),
        sender_id: user_id.to_string(),
        content: message,
        message_type,
        timestamp: Utc::now().timestamp_millis(),
    };
    relay::send_to_members_except(&state.connections, &members, user_id, &event);
}

/// Relay an opaque WebRTC negotiation payload (offer/answer/ICE candidate).
/// With a target, delivery is to that member alone; without, to every other
/// member of the room.
pub fn handle_webrtc_signal(
    room_id: &str,
    signal: serde_json::Value,
    target_user_id: Option<&str>,
    state: &AppState,
    user_id: &str,
) {
    let Some(members) = validate_sender(state, room_id, user_id) else {
        return;
    };

    // The type discriminator is the only payload field the relay looks at,
    // and only for logging
    let signal_type = signal
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    if let Some(target) = target_user_id {
        if target == user_id || !members.iter().any(|m| m == target) {
            tracing::warn!(
                room_id = %room_id,
                user_id = %user_id,
                target = %target,
                "Signal target is not another member of the room, dropping"
            );
            return;
        }
    }

    state.rooms.record_relay(room_id, RelayKind::Signal);
    tracing::debug!(
        room_id = %room_id,
        from = %user_id,
        signal_type = %signal_type,
        "Relaying signal"
    );

    let event = ServerEvent::WebrtcSignal {
        signal,
        from_user_id: user_id.to_string(),
        target_user_id: target_user_id.map(str::to_string),
    };

    match target_user_id {
        Some(target) => relay::send_to_user(&state.connections, target, &event),
        None => relay::send_to_members_except(&state.connections, &members, user_id, &event),
    }
}

/// Membership check shared by both relay paths. Unknown or ended rooms are
/// absorbed silently (double-leave and disconnect races reach here);
/// non-member senders are a protocol violation.
fn validate_sender(state: &AppState, room_id: &str, user_id: &str) -> Option<Vec<String>> {
    let Some(members) = state.rooms.active_members(room_id) else {
        tracing::debug!(
            room_id = %room_id,
            user_id = %user_id,
            "Relay into unknown or ended room dropped"
        );
        return None;
    };

    if !members.iter().any(|m| m == user_id) {
        tracing::warn!(
            room_id = %room_id,
            user_id = %user_id,
            "Relay attempt from non-member dropped"
        );
        return None;
    }

    Some(members)
}
