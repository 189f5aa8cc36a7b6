//! Fan-out primitives for server events.
//!
//! Events are serialized once and cloned per recipient. Send failures mean
//! the target connection is mid-teardown; the message is dropped and the
//! disconnect cleanup path handles the rest.

use axum::extract::ws::Message;

use super::{ConnectionRegistry, ConnectionSender};
use crate::ws::protocol::ServerEvent;

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            None
        }
    }
}

/// Send an event down a single connection channel.
pub fn send_to_conn(tx: &ConnectionSender, event: &ServerEvent) {
    if let Some(msg) = encode(event) {
        let _ = tx.send(msg);
    }
}

/// Send an event down a single connection channel, reporting whether the
/// channel accepted it. Used where delivery failure changes control flow
/// (match notification rollback).
pub fn try_send_to_conn(tx: &ConnectionSender, event: &ServerEvent) -> bool {
    match encode(event) {
        Some(msg) => tx.send(msg).is_ok(),
        None => false,
    }
}

/// Send an event to a specific user (all their connections).
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) {
    let Some(msg) = encode(event) else { return };

    if let Some(connections) = registry.get(user_id) {
        for sender in connections.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Fan an event out to every room member except `sender_id`.
pub fn send_to_members_except(
    registry: &ConnectionRegistry,
    members: &[String],
    sender_id: &str,
    event: &ServerEvent,
) {
    for member in members {
        if member != sender_id {
            send_to_user(registry, member, event);
        }
    }
}
