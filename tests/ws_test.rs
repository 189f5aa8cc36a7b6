//! End-to-end tests over a live WebSocket connection: auth, matchmaking,
//! relay scoping, leave/disconnect parity, and the status endpoint.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the server on a random port and return (addr, jwt_secret).
async fn start_test_server_with(
    auto_requeue: bool,
    queue_timeout_secs: Option<u64>,
) -> (SocketAddr, Vec<u8>) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = drift_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = drift_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = drift_server::state::AppState {
        db,
        jwt_secret: jwt_secret.clone(),
        connections: drift_server::ws::new_connection_registry(),
        matchmaker: Arc::new(drift_server::matchmaking::Matchmaker::new()),
        rooms: Arc::new(drift_server::rooms::RoomRegistry::new()),
        disable_guests: false,
        auto_requeue,
        queue_timeout_secs,
        started_at: chrono::Utc::now(),
    };

    let app = drift_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (addr, jwt_secret)
}

async fn start_test_server() -> (SocketAddr, Vec<u8>) {
    start_test_server_with(false, None).await
}

async fn connect_guest(addr: SocketAddr, name: &str) -> WsStream {
    let url = format!("ws://{}/ws?guest={}", addr, name);
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to connect");
    ws
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send");
}

/// Read the next JSON event, skipping transport ping/pong frames.
async fn recv_event(ws: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("Timed out waiting for event")
            .expect("Stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("Valid JSON event")
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected frame: {:?}", other),
        }
    }
}

/// Read events until one of the given type arrives.
async fn recv_event_of(ws: &mut WsStream, event_type: &str) -> Value {
    loop {
        let event = recv_event(ws).await;
        if event["type"] == event_type {
            return event;
        }
    }
}

/// Assert no event arrives within the window.
async fn assert_silent(ws: &mut WsStream, ms: u64) {
    match tokio::time::timeout(Duration::from_millis(ms), ws.next()).await {
        Err(_) => {}
        Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
        Ok(other) => panic!("Expected silence, got {:?}", other),
    }
}

/// Connect two guests and match them on video chat.
/// Returns (alice, bob, room_id, alice_id, bob_id); bob is the initiator.
async fn match_pair(addr: SocketAddr) -> (WsStream, WsStream, String, String, String) {
    let mut alice = connect_guest(addr, "alice").await;
    let alice_id = recv_event_of(&mut alice, "connected").await["user_id"]
        .as_str()
        .unwrap()
        .to_string();

    let mut bob = connect_guest(addr, "bob").await;
    let bob_id = recv_event_of(&mut bob, "connected").await["user_id"]
        .as_str()
        .unwrap()
        .to_string();

    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut alice, "queued").await;

    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;
    let bob_match = recv_event_of(&mut bob, "match-found").await;
    let alice_match = recv_event_of(&mut alice, "match-found").await;

    assert_eq!(alice_match["room_id"], bob_match["room_id"]);
    let room_id = alice_match["room_id"].as_str().unwrap().to_string();

    (alice, bob, room_id, alice_id, bob_id)
}

#[tokio::test]
async fn guest_connect_receives_generated_identity() {
    let (addr, _) = start_test_server().await;

    let mut ws = connect_guest(addr, "anna").await;
    let event = recv_event(&mut ws).await;

    assert_eq!(event["type"], "connected");
    assert_eq!(event["trust_tier"], "guest");
    assert!(!event["user_id"].as_str().unwrap().is_empty());

    // A reconnect gets a fresh guest id
    let first_id = event["user_id"].as_str().unwrap().to_string();
    let mut ws2 = connect_guest(addr, "anna").await;
    let event2 = recv_event(&mut ws2).await;
    assert_ne!(event2["user_id"].as_str().unwrap(), first_id);
}

#[tokio::test]
async fn token_connect_uses_provider_identity() {
    let (addr, jwt_secret) = start_test_server().await;

    let token = drift_server::auth::jwt::issue_access_token(&jwt_secret, "user-7", Some("Pat"))
        .expect("Failed to issue token");
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (mut ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Failed to connect");

    let event = recv_event(&mut ws).await;
    assert_eq!(event["type"], "connected");
    assert_eq!(event["trust_tier"], "authenticated");
    assert_eq!(event["user_id"], "user-7");
}

#[tokio::test]
async fn invalid_token_closes_with_4002() {
    let (addr, _) = start_test_server().await;

    let url = format!("ws://{}/ws?token=not_a_jwt", addr);
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Upgrade should succeed even with a bad token");
    let (_, mut read) = ws.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002)
            );
        }
        Some(Ok(Message::Close(None))) | None => {}
        other => {
            if let Some(Ok(msg)) = other {
                assert!(msg.is_close(), "Expected close, got: {:?}", msg);
            }
        }
    }
}

#[tokio::test]
async fn missing_credentials_rejected() {
    let (addr, _) = start_test_server().await;

    let url = format!("ws://{}/ws", addr);
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("Upgrade should succeed");
    let (_, mut read) = ws.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close within timeout");
    if let Some(Ok(msg)) = msg {
        assert!(msg.is_close(), "Expected close, got: {:?}", msg);
    }
}

#[tokio::test]
async fn two_video_users_match_with_opposite_roles() {
    let (addr, _) = start_test_server().await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;
    let mut bob = connect_guest(addr, "bob").await;
    recv_event_of(&mut bob, "connected").await;

    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    let queued = recv_event_of(&mut alice, "queued").await;
    assert_eq!(queued["chat_type"], "video");

    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;

    let bob_match = recv_event_of(&mut bob, "match-found").await;
    let alice_match = recv_event_of(&mut alice, "match-found").await;

    assert_eq!(alice_match["room_id"], bob_match["room_id"]);
    assert_eq!(alice_match["chat_type"], "video");
    assert_eq!(bob_match["chat_type"], "video");

    // Exactly one initiator: bob triggered the match
    assert_eq!(bob_match["is_initiator"], true);
    assert_eq!(alice_match["is_initiator"], false);
}

#[tokio::test]
async fn incompatible_types_wait_for_wildcard_third_party() {
    let (addr, _) = start_test_server().await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;
    let mut bob = connect_guest(addr, "bob").await;
    recv_event_of(&mut bob, "connected").await;

    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "text"})).await;
    recv_event_of(&mut alice, "queued").await;
    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut bob, "queued").await;

    // text vs video: no match for either
    assert_silent(&mut alice, 300).await;
    assert_silent(&mut bob, 300).await;

    // A wildcard third party matches the earliest waiter (alice) on her medium
    let mut carol = connect_guest(addr, "carol").await;
    recv_event_of(&mut carol, "connected").await;
    send_json(&mut carol, json!({"type": "join-queue", "chat_type": "both"})).await;

    let carol_match = recv_event_of(&mut carol, "match-found").await;
    let alice_match = recv_event_of(&mut alice, "match-found").await;
    assert_eq!(carol_match["room_id"], alice_match["room_id"]);
    assert_eq!(alice_match["chat_type"], "text");

    // bob is still waiting
    assert_silent(&mut bob, 300).await;
}

#[tokio::test]
async fn chat_messages_relay_to_the_other_member_only() {
    let (addr, _) = start_test_server().await;
    let (mut alice, mut bob, room_id, alice_id, _bob_id) = match_pair(addr).await;

    send_json(
        &mut alice,
        json!({"type": "send-message", "room_id": room_id, "message": "hello there"}),
    )
    .await;

    let msg = recv_event_of(&mut bob, "new-message").await;
    assert_eq!(msg["room_id"], room_id.as_str());
    assert_eq!(msg["sender_id"], alice_id.as_str());
    assert_eq!(msg["content"], "hello there");
    assert_eq!(msg["message_type"], "text");
    assert!(msg["timestamp"].is_i64());

    // No echo back to the sender
    assert_silent(&mut alice, 300).await;
}

#[tokio::test]
async fn webrtc_signals_relay_opaquely() {
    let (addr, _) = start_test_server().await;
    let (mut alice, mut bob, room_id, alice_id, bob_id) = match_pair(addr).await;

    send_json(
        &mut alice,
        json!({
            "type": "webrtc-signal",
            "room_id": room_id,
            "signal": {"type": "offer", "sdp": "v=0 o=- 46117 2"},
        }),
    )
    .await;

    let signal = recv_event_of(&mut bob, "webrtc-signal").await;
    assert_eq!(signal["from_user_id"], alice_id.as_str());
    assert_eq!(signal["signal"]["type"], "offer");
    assert_eq!(signal["signal"]["sdp"], "v=0 o=- 46117 2");

    // Targeted answer goes back to alice alone
    send_json(
        &mut bob,
        json!({
            "type": "webrtc-signal",
            "room_id": room_id,
            "signal": {"type": "answer", "sdp": "v=0"},
            "target_user_id": alice_id,
        }),
    )
    .await;

    let answer = recv_event_of(&mut alice, "webrtc-signal").await;
    assert_eq!(answer["from_user_id"], bob_id.as_str());
    assert_eq!(answer["target_user_id"], alice_id.as_str());
    assert_eq!(answer["signal"]["type"], "answer");
}

#[tokio::test]
async fn relay_is_scoped_to_room_members() {
    let (addr, _) = start_test_server().await;
    let (mut alice, mut bob, room_id, _alice_id, _bob_id) = match_pair(addr).await;

    // A bystander who knows the room id cannot inject into it
    let mut mallory = connect_guest(addr, "mallory").await;
    recv_event_of(&mut mallory, "connected").await;
    send_json(
        &mut mallory,
        json!({"type": "send-message", "room_id": room_id, "message": "let me in"}),
    )
    .await;

    // ...and never receives the room's traffic
    send_json(
        &mut alice,
        json!({"type": "send-message", "room_id": room_id, "message": "private"}),
    )
    .await;

    let msg = recv_event_of(&mut bob, "new-message").await;
    assert_eq!(msg["content"], "private");
    assert_silent(&mut mallory, 300).await;

    // Relay into a nonexistent room is absorbed silently
    send_json(
        &mut alice,
        json!({"type": "send-message", "room_id": "no-such-room", "message": "x"}),
    )
    .await;
    assert_silent(&mut alice, 300).await;
    assert_silent(&mut bob, 300).await;
}

#[tokio::test]
async fn leave_room_notifies_partner_exactly_once() {
    let (addr, _) = start_test_server().await;
    let (mut alice, mut bob, room_id, _alice_id, _bob_id) = match_pair(addr).await;

    send_json(&mut alice, json!({"type": "leave-room", "room_id": room_id})).await;

    let left = recv_event_of(&mut bob, "user-left").await;
    assert_eq!(left["room_id"], room_id.as_str());

    // Double leave: no second transition, no second notification
    send_json(&mut alice, json!({"type": "leave-room", "room_id": room_id})).await;
    assert_silent(&mut bob, 300).await;

    // The other side's late leave of the ended room is also a no-op
    send_json(&mut bob, json!({"type": "leave-room", "room_id": room_id})).await;
    assert_silent(&mut alice, 300).await;
}

#[tokio::test]
async fn abrupt_disconnect_matches_explicit_leave() {
    let (addr, _) = start_test_server().await;
    let (alice, mut bob, room_id, _alice_id, _bob_id) = match_pair(addr).await;

    // alice vanishes without a leave-room
    drop(alice);

    let left = recv_event_of(&mut bob, "user-left").await;
    assert_eq!(left["room_id"], room_id.as_str());

    // bob can re-queue and match someone new; alice's state is fully purged
    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut bob, "queued").await;

    let mut dave = connect_guest(addr, "dave").await;
    recv_event_of(&mut dave, "connected").await;
    send_json(&mut dave, json!({"type": "join-queue", "chat_type": "video"})).await;

    let dave_match = recv_event_of(&mut dave, "match-found").await;
    let bob_match = recv_event_of(&mut bob, "match-found").await;
    assert_eq!(dave_match["room_id"], bob_match["room_id"]);
    assert_ne!(bob_match["room_id"], room_id.as_str(), "room ids are never reused");
}

#[tokio::test]
async fn join_queue_is_idempotent() {
    let (addr, _) = start_test_server().await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;

    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut alice, "queued").await;
    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut alice, "queued").await;

    let mut bob = connect_guest(addr, "bob").await;
    recv_event_of(&mut bob, "connected").await;
    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;

    recv_event_of(&mut bob, "match-found").await;
    recv_event_of(&mut alice, "match-found").await;

    // Exactly one match for alice despite the duplicate join
    assert_silent(&mut alice, 300).await;
}

#[tokio::test]
async fn queue_timeout_notifies_and_dequeues() {
    let (addr, _) = start_test_server_with(false, Some(1)).await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;
    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut alice, "queued").await;

    let timeout = tokio::time::timeout(Duration::from_secs(3), async {
        recv_event_of(&mut alice, "queue-timeout").await
    })
    .await;
    assert!(timeout.is_ok(), "Expected queue-timeout within 3s");

    // alice is out of the pool: a later video user just waits
    let mut bob = connect_guest(addr, "bob").await;
    recv_event_of(&mut bob, "connected").await;
    send_json(&mut bob, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut bob, "queued").await;
    assert_silent(&mut bob, 300).await;
}

#[tokio::test]
async fn auto_requeue_puts_survivor_back_in_the_pool() {
    let (addr, _) = start_test_server_with(true, None).await;
    let (alice, mut bob, _room_id, _alice_id, _bob_id) = match_pair(addr).await;

    drop(alice);

    recv_event_of(&mut bob, "user-left").await;
    let requeued = recv_event_of(&mut bob, "queued").await;
    assert_eq!(requeued["chat_type"], "video");

    // A fresh video user matches the auto-requeued survivor
    let mut carol = connect_guest(addr, "carol").await;
    recv_event_of(&mut carol, "connected").await;
    send_json(&mut carol, json!({"type": "join-queue", "chat_type": "video"})).await;

    let carol_match = recv_event_of(&mut carol, "match-found").await;
    let bob_match = recv_event_of(&mut bob, "match-found").await;
    assert_eq!(carol_match["room_id"], bob_match["room_id"]);
}

#[tokio::test]
async fn malformed_json_gets_error_and_connection_survives() {
    let (addr, _) = start_test_server().await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;

    send_json(&mut alice, json!({"type": "no-such-event"})).await;
    let err = recv_event_of(&mut alice, "error").await;
    assert!(!err["message"].as_str().unwrap().is_empty());

    // Still usable afterwards
    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "text"})).await;
    recv_event_of(&mut alice, "queued").await;
}

#[tokio::test]
async fn status_endpoint_reports_counts() {
    let (addr, _) = start_test_server().await;

    let mut alice = connect_guest(addr, "alice").await;
    recv_event_of(&mut alice, "connected").await;
    let mut bob = connect_guest(addr, "bob").await;
    recv_event_of(&mut bob, "connected").await;

    send_json(&mut alice, json!({"type": "join-queue", "chat_type": "video"})).await;
    recv_event_of(&mut alice, "queued").await;

    let client = reqwest::Client::new();

    let health = client
        .get(format!("http://{}/health", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(health.text().await.unwrap(), "ok");

    let status: Value = client
        .get(format!("http://{}/api/status", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["users_connected"], 2);
    assert_eq!(status["queued"], 1);
    assert_eq!(status["active_rooms"], 0);
    assert!(!status["version"].as_str().unwrap().is_empty());
}
