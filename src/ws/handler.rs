use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth::identity::{self, AuthError};
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Credentials travel as query
/// params: either a bearer token or a guest display name.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
    pub guest: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token invalid or credentials missing
/// 4003 = guest access disabled
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_INVALID_CREDENTIALS: u16 = 4002;
const CLOSE_GUEST_DISABLED: u16 = 4003;

/// GET /ws?token=JWT or GET /ws?guest=DisplayName
/// WebSocket upgrade endpoint. Identity resolution runs once here, never
/// per message. On auth failure, upgrades then immediately closes with the
/// appropriate close code. On success, spawns an actor for the connection.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let resolved = identity::authenticate(
        &state.jwt_secret,
        !state.disable_guests,
        params.token.as_deref(),
        params.guest.as_deref(),
    );

    match resolved {
        Ok(identity) => {
            tracing::info!(
                user_id = %identity.user_id,
                tier = ?identity.tier,
                "WebSocket connection authenticated"
            );
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity))
        }
        Err(err) => {
            let (close_code, reason) = match &err {
                e if e.is_expired() => (CLOSE_TOKEN_EXPIRED, "Token expired"),
                AuthError::GuestAccessDisabled => (CLOSE_GUEST_DISABLED, "Guest access disabled"),
                _ => (CLOSE_INVALID_CREDENTIALS, "Invalid credentials"),
            };

            tracing::warn!(
                close_code = close_code,
                error = %err,
                "WebSocket auth failed"
            );

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

/// Handle an authenticated WebSocket connection by spawning the actor.
async fn handle_authenticated(
    socket: WebSocket,
    state: AppState,
    identity: identity::UserIdentity,
) {
    actor::run_connection(socket, state, identity).await;
}
