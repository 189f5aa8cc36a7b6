mod auth;
mod config;
mod db;
mod matchmaking;
mod rooms;
mod routes;
mod signaling;
mod state;
mod ws;

use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use config::{generate_config_template, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "drift_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "drift_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Drift server v{} starting", env!("CARGO_PKG_VERSION"));

    // Initialize the audit database
    let db = db::init_db(&config.data_dir)?;

    // Load or generate the JWT signing key (256-bit random, stored in data_dir)
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    if config.disable_guests {
        tracing::info!("Guest access disabled; token auth only");
    }

    // Build application state
    let app_state = state::AppState {
        db,
        jwt_secret,
        connections: ws::new_connection_registry(),
        matchmaker: Arc::new(matchmaking::Matchmaker::new()),
        rooms: Arc::new(rooms::RoomRegistry::new()),
        disable_guests: config.disable_guests,
        auto_requeue: config.auto_requeue,
        queue_timeout_secs: config.queue_timeout_secs,
        started_at: Utc::now(),
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
