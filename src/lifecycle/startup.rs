//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Rules load before the listeners bind, so readiness reflects the
//!   first load
//! - Listeners start last (traffic only when ready)

use std::path::Path;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{load_config, ConfigError, GatekeeperConfig};
use crate::http::AppState;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unable to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration from `path`, or the defaults when no path is given.
pub fn configuration(path: Option<&Path>) -> Result<GatekeeperConfig, StartupError> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => {
            tracing::warn!("No configuration file given, using defaults");
            Ok(GatekeeperConfig::default())
        }
    }
}

/// Build the application state; this loads the rule repositories.
pub fn state(config: GatekeeperConfig) -> AppState {
    let state = AppState::new(config);
    let inner = state.load();
    tracing::info!(
        rules = inner.rules.count(),
        matching_strategy = ?inner.rules.matching_strategy(),
        "Access rules ready"
    );
    state
}

/// Bind the API and the proxy listeners, in that order.
pub async fn bind(config: &GatekeeperConfig) -> Result<(TcpListener, TcpListener), StartupError> {
    let api = bind_one(&config.serve.api.bind_address).await?;
    let proxy = bind_one(&config.serve.proxy.bind_address).await?;
    Ok((api, proxy))
}

async fn bind_one(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}
