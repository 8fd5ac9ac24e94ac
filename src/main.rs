//! Gatekeeper (v1)
//!
//! An identity and access proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────┐
//!                   │                      GATEKEEPER                      │
//!                   │                                                      │
//!  Edge proxy ──────┼─▶ API :4456 ──▶ /decisions ──┐                       │
//!                   │                              ▼                       │
//!                   │                       ┌────────────┐   ┌──────────┐  │
//!                   │                       │ rule match │──▶│ authn    │  │
//!                   │                       └────────────┘   │ authz    │  │
//!                   │                              ▲         │ mutate   │  │
//!  Client ──────────┼─▶ Proxy :4455 ───────────────┘         └────┬─────┘  │
//!                   │        │                                    │        │
//!                   │        ▼ granted                  denied    ▼        │
//!  Upstream ◀───────┼── forward                         error handler      │
//!                   │                                                      │
//!                   │  config (TOML, hot reload) · rules (JSON) · logging  │
//!                   └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;

use gatekeeper::config::ConfigWatcher;
use gatekeeper::lifecycle::{startup, Shutdown};
use gatekeeper::observability::logging;
use gatekeeper::GatekeeperServer;

#[derive(Parser)]
#[command(name = "gatekeeper", version, about = "Identity and access proxy")]
struct Args {
    /// Configuration file (TOML).
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::configuration(args.config.as_deref())?;
    logging::init(&config.log)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatekeeper starting");
    tracing::info!(
        api_address = %config.serve.api.bind_address,
        proxy_address = %config.serve.proxy.bind_address,
        repositories = config.access_rules.repositories.len(),
        "Configuration loaded"
    );

    // The watcher task runs until the update receiver is dropped.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (Some(watcher.run()?), updates)
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let state = startup::state(config);
    let (api_listener, proxy_listener) = startup::bind(&state.load().config).await?;

    let shutdown = Shutdown::new();
    let _signals = shutdown.trigger_on_signal();

    GatekeeperServer::new(state)
        .run(api_listener, proxy_listener, config_updates, &shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
