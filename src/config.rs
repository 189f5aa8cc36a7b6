use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Drift coordination server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "drift-server", version, about = "Drift matchmaking and signaling server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "DRIFT_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "DRIFT_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./drift.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "DRIFT_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (audit DB, JWT key)
    #[arg(long, env = "DRIFT_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Refuse guest connections; only token-authenticated users may connect
    #[arg(long, env = "DRIFT_DISABLE_GUESTS")]
    pub disable_guests: bool,

    /// Automatically re-queue a user whose partner left or disconnected
    #[arg(long, env = "DRIFT_AUTO_REQUEUE")]
    pub auto_requeue: bool,

    /// Seconds a user may wait in the queue before a queue-timeout
    /// notification; unset means wait indefinitely
    #[arg(long, env = "DRIFT_QUEUE_TIMEOUT_SECS")]
    pub queue_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./drift.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            disable_guests: false,
            auto_requeue: false,
            queue_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (DRIFT_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("DRIFT_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Drift Server Configuration
# Place this file at ./drift.toml or specify with --config <path>
# All settings can be overridden via environment variables (DRIFT_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the audit database and JWT signing key
# data_dir = "./data"

# Refuse guest connections (default: false, guests welcome)
# disable_guests = false

# Re-queue a user automatically when their partner leaves (default: false;
# the client decides, based on the user-left event)
# auto_requeue = false

# Maximum seconds to wait in the match queue before the server sends a
# queue-timeout notification. Unset: wait indefinitely.
# queue_timeout_secs = 120
"#
    .to_string()
}
