//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gatekeeper.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::HandlerKind;
use crate::rule::MatchingStrategy;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatekeeperConfig {
    /// Listener configuration for the API and the reverse proxy.
    pub serve: ServeConfig,

    /// Logging settings.
    pub log: LogConfig,

    /// Where rules come from and how their URLs are matched.
    pub access_rules: AccessRulesConfig,

    /// Authenticator settings, keyed by handler id.
    pub authenticators: HashMap<String, HandlerSettings>,

    /// Authorizer settings, keyed by handler id.
    pub authorizers: HashMap<String, HandlerSettings>,

    /// Mutator settings, keyed by handler id.
    pub mutators: HashMap<String, HandlerSettings>,

    /// Error handler settings and the fallback chain.
    pub errors: ErrorsConfig,

    /// Key material exposed on the JWKS endpoint.
    pub credentials: CredentialsConfig,
}

impl GatekeeperConfig {
    /// Settings of one handler. Absent handlers are disabled.
    pub fn handler_settings(&self, kind: HandlerKind, id: &str) -> HandlerSettings {
        let table = match kind {
            HandlerKind::Authenticator => &self.authenticators,
            HandlerKind::Authorizer => &self.authorizers,
            HandlerKind::Mutator => &self.mutators,
            HandlerKind::ErrorHandler => &self.errors.handlers,
        };
        table.get(id).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServeConfig {
    pub proxy: ProxyListenerConfig,
    pub api: ApiListenerConfig,
}

/// Reverse-proxy listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4455").
    pub bind_address: String,

    /// Honour `X-Forwarded-Proto` when rebuilding the request URL.
    pub trust_forwarded_headers: bool,

    /// Total time for request/response in seconds.
    pub timeout_secs: u64,
}

impl Default for ProxyListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4455".to_string(),
            trust_forwarded_headers: false,
            timeout_secs: 30,
        }
    }
}

/// Decision and management API listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiListenerConfig {
    /// Bind address (e.g., "0.0.0.0:4456").
    pub bind_address: String,

    /// Total time for request/response in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4456".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,

    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessRulesConfig {
    /// JSON rule files; a `file://` prefix is accepted.
    pub repositories: Vec<String>,

    pub matching_strategy: MatchingStrategy,
}

/// Process-wide settings of a single handler.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HandlerSettings {
    pub enabled: bool,

    /// Base configuration, merged with rule-level overrides.
    pub config: Value,
}

impl HandlerSettings {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            config: Value::Null,
        }
    }

    pub fn enabled_with(config: Value) -> Self {
        Self {
            enabled: true,
            config,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Error handlers tried in order when no rule-level handler is eligible.
    pub fallback: Vec<String>,

    pub handlers: HashMap<String, HandlerSettings>,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        let mut handlers = HashMap::new();
        handlers.insert("json".to_string(), HandlerSettings::enabled());
        Self {
            fallback: vec!["json".to_string()],
            handlers,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    /// JSON Web Key Set file; only public key members are served.
    pub jwks_path: Option<String>,
}
