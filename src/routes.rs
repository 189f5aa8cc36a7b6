use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;
use tower_governor::key_extractor::PeerIpKeyExtractor;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// GET /api/status: process liveness and live counts, for deployment
/// tooling. Not part of the matchmaking contract.
async fn status(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "drift".to_string());

    let users_connected = state.connections.len();
    let connections: usize = state.connections.iter().map(|e| e.value().len()).sum();

    Json(serde_json::json!({
        "name": name,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "users_connected": users_connected,
        "connections": connections,
        "queued": state.matchmaker.pool().len(),
        "active_rooms": state.rooms.active_count(),
    }))
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Rate limiting on the WebSocket upgrade: connection churn control per
    // peer IP. Uses PeerIpKeyExtractor, which reads ConnectInfo<SocketAddr>.
    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .key_extractor(PeerIpKeyExtractor)
            .per_second(2)
            .burst_size(30)
            .finish()
            .expect("Failed to build governor config"),
    );
    let governor_limiter = governor_config.limiter().clone();

    // Background task to clean up rate limiter state
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    // WebSocket endpoint (auth via query param at upgrade time)
    let ws_routes = Router::new()
        .route("/ws", axum::routing::get(ws_handler::ws_upgrade))
        .layer(GovernorLayer {
            config: governor_config,
        });

    // Health check and status (no auth, no rate limiting)
    let ops_routes = Router::new()
        .route("/health", axum::routing::get(health_check))
        .route("/api/status", axum::routing::get(status));

    Router::new()
        .merge(ws_routes)
        .merge(ops_routes)
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
