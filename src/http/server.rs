//! HTTP server setup.
//!
//! # Responsibilities
//! - Hold the hot-swappable application state (config, rules, handlers)
//! - Build the API router (decisions, rules, health, JWKS) and the
//!   reverse-proxy router
//! - Serve both listeners until shutdown, applying config updates live
//!
//! # Design Decisions
//! - Every request loads one state snapshot and uses it to completion; a
//!   reload never changes the rules or handlers under an in-flight request
//! - A reload builds a new snapshot and stores it once; rules carried over
//!   from the previous snapshot keep their compiled patterns

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    routing::{any, get},
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::{decision, health, jwks, rules};
use crate::config::GatekeeperConfig;
use crate::http::request::{propagate_request_id, set_request_id};
use crate::lifecycle::Shutdown;
use crate::pipeline::HandlerRegistry;
use crate::proxy::{forward, RequestHandler};
use crate::rule::{loader, validator, Rule, RuleRepository};

/// Everything a request needs, swapped as a unit on reload.
#[derive(Debug)]
pub struct InnerState {
    pub config: GatekeeperConfig,
    pub rules: Arc<RuleRepository>,
    pub handler: Arc<RequestHandler>,
    /// Public key set served on `/.well-known/jwks.json`.
    pub jwks: Value,
}

impl InnerState {
    fn new(config: GatekeeperConfig, rules: RuleRepository) -> Self {
        Self {
            handler: Arc::new(build_handler(&config)),
            jwks: jwks::load_public_keys(config.credentials.jwks_path.as_deref()),
            rules: Arc::new(rules),
            config,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<InnerState>>,
    pub client: Client<HttpConnector, Body>,
}

impl AppState {
    /// Build the state from `config`, loading its rule repositories.
    pub fn new(config: GatekeeperConfig) -> Self {
        let rules = RuleRepository::new(config.access_rules.matching_strategy);
        let state = Self::from_inner(InnerState::new(config.clone(), rules));
        state.reload(config);
        state
    }

    /// Build the state with an in-memory rule set; repositories are ignored.
    pub fn with_rules(config: GatekeeperConfig, rules: Vec<Rule>) -> Self {
        let strategy = config.access_rules.matching_strategy;
        let registry = HandlerRegistry::from_config(&config);
        validator::log_violations(&rules, &registry, strategy);
        Self::from_inner(InnerState::new(config, RuleRepository::with_rules(strategy, rules)))
    }

    fn from_inner(inner: InnerState) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
            client,
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<InnerState> {
        self.inner.load_full()
    }

    /// Apply a new configuration as one snapshot swap. Snapshots already
    /// handed out keep their rules, strategy and handlers. Rule files that
    /// fail to load keep the current rules in place.
    pub fn reload(&self, config: GatekeeperConfig) {
        let current = self.load();
        let strategy = config.access_rules.matching_strategy;
        let handler = Arc::new(build_handler(&config));

        let rules = if config.access_rules.repositories.is_empty() {
            tracing::warn!("No access rule repositories are configured");
            RuleRepository::with_rules(strategy, Vec::new())
        } else {
            match loader::load_rules(&config.access_rules.repositories) {
                Ok(rules) => {
                    validator::log_violations(&rules, handler.registry(), strategy);
                    RuleRepository::with_rules(strategy, rules)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Unable to load access rules, keeping the current rules");
                    current.rules.with_matching_strategy(strategy)
                }
            }
        };

        let count = rules.count();
        let jwks = jwks::load_public_keys(config.credentials.jwks_path.as_deref());
        self.inner.store(Arc::new(InnerState {
            config,
            rules: Arc::new(rules),
            handler,
            jwks,
        }));
        tracing::info!(rules = count, "Configuration applied");
    }
}

fn build_handler(config: &GatekeeperConfig) -> RequestHandler {
    RequestHandler::new(
        Arc::new(HandlerRegistry::from_config(config)),
        config.errors.fallback.clone(),
    )
}

/// The decision API and the reverse proxy, served on two listeners.
pub struct GatekeeperServer {
    state: AppState,
}

impl GatekeeperServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Decisions, rules, health, version and JWKS.
    pub fn api_router(&self) -> Router {
        let timeout = self.state.load().config.serve.api.timeout_secs;
        let router = Router::new()
            .route("/decisions", any(decision::decisions))
            .route("/decisions/traefik", get(decision::traefik).fallback(decision::decisions))
            .route("/decisions/{*path}", any(decision::decisions))
            .route("/rules", get(rules::list_rules))
            .route("/rules/{id}", get(rules::get_rule))
            .route("/health/alive", get(health::alive))
            .route("/health/ready", get(health::ready))
            .route("/version", get(health::version))
            .route("/.well-known/jwks.json", get(jwks::public_keys))
            .with_state(self.state.clone());
        with_common_layers(router, timeout)
    }

    /// Every path is evaluated and, if granted, forwarded upstream.
    pub fn proxy_router(&self) -> Router {
        let timeout = self.state.load().config.serve.proxy.timeout_secs;
        let router = Router::new()
            .route("/", any(forward::forward))
            .route("/{*path}", any(forward::forward))
            .with_state(self.state.clone());
        with_common_layers(router, timeout)
    }

    /// Serve until `shutdown` fires, applying every config from `config_updates`.
    pub async fn run(
        self,
        api_listener: TcpListener,
        proxy_listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatekeeperConfig>,
        shutdown: &Shutdown,
    ) -> Result<(), std::io::Error> {
        tracing::info!(address = %api_listener.local_addr()?, "API server starting");
        tracing::info!(address = %proxy_listener.local_addr()?, "Proxy server starting");

        let state = self.state.clone();
        let mut reload_shutdown = shutdown.subscribe();
        let reloader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = reload_shutdown.recv() => break,
                    update = config_updates.recv() => match update {
                        Some(config) => {
                            tracing::info!("Applying configuration update");
                            state.reload(config);
                        }
                        None => break,
                    },
                }
            }
        });

        let mut api_shutdown = shutdown.subscribe();
        let api = axum::serve(
            api_listener,
            self.api_router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = api_shutdown.recv().await;
        });

        let mut proxy_shutdown = shutdown.subscribe();
        let proxy = axum::serve(
            proxy_listener,
            self.proxy_router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = proxy_shutdown.recv().await;
        });

        let result = tokio::try_join!(async { api.await }, async { proxy.await });
        reloader.abort();
        result?;

        tracing::info!("HTTP servers stopped");
        Ok(())
    }
}

#[allow(deprecated)]
fn with_common_layers(router: Router, timeout_secs: u64) -> Router {
    router
        .layer(TimeoutLayer::new(Duration::from_secs(timeout_secs)))
        .layer(propagate_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(set_request_id())
}
