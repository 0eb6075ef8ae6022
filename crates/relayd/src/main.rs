//! relayd - OCPP Relay Daemon
//!
//! Transparent man-in-the-middle proxy between EV chargers and a CSMS.
//! Chargers connect to `/ocpp/{chargePointId}`; traffic is spliced to the
//! configured CSMS, every frame is recorded, and operators can inject
//! commands that stay invisible to the CSMS.
//!
//! Usage:
//!   relayd [config.toml]
//!
//! If no config file is provided, the relay starts with defaults (standalone
//! behavior until a CSMS URL is configured via the API) and the in-memory
//! store.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use relay_api::{create_router, AppState};
use relay_core::RelayConfig;
use relay_session::{RelayContext, SessionRegistry};
use relay_store::{LogSpool, MemoryStore, RelayStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_PORT: u16 = 8081;

/// Parsed command-line arguments
struct Args {
    /// Server config file (TOML)
    config_path: Option<String>,
}

fn parse_args() -> Args {
    let mut result = Args { config_path: None };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if !other.starts_with('-') => {
                result.config_path = Some(other.to_string());
            }
            other => {
                tracing::warn!("Unknown argument: {}", other);
            }
        }
    }

    result
}

fn print_help() {
    eprintln!(
        r#"relayd - OCPP Relay Daemon

Usage: relayd [OPTIONS] [config.toml]

Options:
  -h, --help    Print this help message

Examples:
  # Run with defaults (in-memory store, no CSMS configured)
  relayd

  # Run with a config file
  relayd config.toml
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relayd=info,relay_api=info,relay_session=debug,relay_store=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting relayd (OCPP Relay Daemon)");

    let args = parse_args();
    let store = Arc::new(MemoryStore::new());

    let port = if let Some(ref path) = args.config_path {
        tracing::info!("Loading config from: {}", path);
        load_config_file(path, &store).await?
    } else {
        tracing::info!("No config file provided, starting with defaults");
        DEFAULT_PORT
    };

    // Stored rows (seeded from the file, or left over from a previous run
    // with a durable backend) become the initial snapshot.
    let entries: HashMap<String, String> = store
        .config_all()
        .await
        .map_err(|e| anyhow::anyhow!("failed to read configuration: {e}"))?;
    let config = RelayConfig::from_entries(&entries)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    tracing::info!(
        target_csms_url = %config.target_csms_url,
        forwarding = config.csms_forwarding_enabled,
        auto_charge = config.auto_charge_enabled,
        "runtime configuration loaded"
    );

    let store: Arc<dyn RelayStore> = store;
    let spool = LogSpool::spawn(store.clone());
    let ctx = Arc::new(RelayContext::new(store, spool, config));
    let registry = Arc::new(SessionRegistry::new());

    let state = AppState::new(registry, ctx);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Load the TOML config file: `[server].port` plus the `[relay]` table of
/// runtime configuration keys, which are seeded into the store as rows.
async fn load_config_file(path: &str, store: &Arc<MemoryStore>) -> anyhow::Result<u16> {
    let content = std::fs::read_to_string(path)?;
    let config: toml::Value = toml::from_str(&content)?;

    let port = config
        .get("server")
        .and_then(|s| s.get("port"))
        .and_then(|p| p.as_integer())
        .unwrap_or(DEFAULT_PORT as i64) as u16;

    if let Some(relay) = config.get("relay").and_then(|r| r.as_table()) {
        for (key, value) in relay {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            store.seed_config(key, &value);
        }
        tracing::info!(keys = relay.len(), "seeded configuration from file");
    }

    Ok(port)
}
