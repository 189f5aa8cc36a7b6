//! Wire protocol: JSON text frames, tagged by a `type` field.
//!
//! Incoming frames are decoded into `ClientEvent` and dispatched to the
//! signaling handlers; outgoing traffic is `ServerEvent`. Signal payloads
//! stay opaque `serde_json::Value`s end to end.

use serde::{Deserialize, Serialize};

use crate::auth::identity::TrustTier;
use crate::signaling;
use crate::state::AppState;
use crate::ws::{relay, ConnectionSender};

/// Requested conversation medium. `Both` is the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Video,
    Text,
    Both,
}

impl ChatType {
    /// Symmetric pairwise compatibility: exact match, or either side
    /// holding the wildcard.
    pub fn compatible_with(self, other: ChatType) -> bool {
        self == other || self == ChatType::Both || other == ChatType::Both
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChatType::Video => "video",
            ChatType::Text => "text",
            ChatType::Both => "both",
        }
    }
}

/// Chat message classification, relayed verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    System,
    Emoji,
}

/// Client -> server events.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEvent {
    JoinQueue {
        chat_type: ChatType,
    },
    SendMessage {
        room_id: String,
        message: String,
        #[serde(default)]
        message_type: MessageType,
    },
    WebrtcSignal {
        room_id: String,
        signal: serde_json::Value,
        #[serde(default)]
        target_user_id: Option<String>,
    },
    LeaveRoom {
        room_id: String,
    },
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Connected {
        user_id: String,
        trust_tier: TrustTier,
    },
    Queued {
        chat_type: ChatType,
    },
    MatchFound {
        room_id: String,
        chat_type: ChatType,
        is_initiator: bool,
    },
    NewMessage {
        room_id: String,
        sender_id: String,
        content: String,
        message_type: MessageType,
        timestamp: i64,
    },
    WebrtcSignal {
        signal: serde_json::Value,
        from_user_id: String,
        target_user_id: Option<String>,
    },
    UserLeft {
        room_id: String,
    },
    QueueTimeout,
    Error {
        message: String,
    },
}

/// Handle an incoming text frame: decode the ClientEvent and dispatch.
/// Malformed JSON gets an error event; the connection stays open.
pub async fn handle_text_message(
    text: &str,
    tx: &ConnectionSender,
    state: &AppState,
    user_id: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                user_id = %user_id,
                error = %e,
                "Failed to decode client event"
            );
            relay::send_to_conn(
                tx,
                &ServerEvent::Error {
                    message: "Invalid message".to_string(),
                },
            );
            return;
        }
    };

    match event {
        ClientEvent::JoinQueue { chat_type } => {
            signaling::queue::handle_join_queue(chat_type, tx, state, user_id);
        }
        ClientEvent::SendMessage {
            room_id,
            message,
            message_type,
        } => {
            signaling::chat::handle_send_message(&room_id, message, message_type, state, user_id);
        }
        ClientEvent::WebrtcSignal {
            room_id,
            signal,
            target_user_id,
        } => {
            signaling::chat::handle_webrtc_signal(
                &room_id,
                signal,
                target_user_id.as_deref(),
                state,
                user_id,
            );
        }
        ClientEvent::LeaveRoom { room_id } => {
            signaling::lifecycle::handle_leave_room(&room_id, state, user_id);
        }
    }
}
