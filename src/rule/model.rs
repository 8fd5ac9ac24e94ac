//! Access rule data model.

use std::sync::OnceLock;

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::rule::engine::{CompiledPattern, MatchingStrategy, PatternError};

/// Protocol a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Grpc,
}

/// A policy unit: which requests it covers, how they are authenticated,
/// authorized and mutated, how failures are reported, and where allowed
/// requests are forwarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Unique, stable identifier.
    pub id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "match")]
    pub match_: RuleMatch,

    /// Ordered OR-chain of authenticators.
    #[serde(default)]
    pub authenticators: Vec<RuleHandler>,

    /// The single authorizer.
    #[serde(default)]
    pub authorizer: RuleHandler,

    /// Ordered AND-chain of mutators.
    #[serde(default)]
    pub mutators: Vec<RuleHandler>,

    /// Candidate error handlers, selected by their `when` predicates.
    #[serde(default)]
    pub errors: Vec<RuleHandler>,

    #[serde(default)]
    pub upstream: Upstream,
}

/// Which requests a rule applies to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleMatch {
    #[serde(default)]
    pub methods: Vec<String>,

    /// URL pattern with `<...>` delimited segments.
    pub url: String,

    #[serde(default)]
    pub protocol: Protocol,

    #[serde(skip)]
    compiled: PatternCache,
}

impl RuleMatch {
    pub fn new(methods: &[&str], url: impl Into<String>) -> Self {
        Self {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            url: url.into(),
            protocol: Protocol::Http,
            compiled: PatternCache::default(),
        }
    }
}

impl PartialEq for RuleMatch {
    fn eq(&self, other: &Self) -> bool {
        self.methods == other.methods && self.url == other.url && self.protocol == other.protocol
    }
}

/// A handler reference: registry name plus opaque, rule-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RuleHandler {
    pub handler: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl RuleHandler {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            config: Value::Null,
        }
    }

    pub fn with_config(handler: impl Into<String>, config: Value) -> Self {
        Self {
            handler: handler.into(),
            config,
        }
    }
}

/// Where allowed requests are forwarded in reverse-proxy mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Upstream {
    #[serde(default)]
    pub url: String,

    /// Prefix removed (once) from the forwarded path.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub strip_path: String,

    /// Keep the inbound `Host` header instead of the upstream host.
    #[serde(default)]
    pub preserve_host: bool,
}

/// Compile-once cache of the rule's URL pattern, one slot per strategy so
/// switching strategy never discards the other compilation.
#[derive(Debug, Default)]
struct PatternCache {
    regexp: OnceLock<Result<CompiledPattern, PatternError>>,
    glob: OnceLock<Result<CompiledPattern, PatternError>>,
}

// A cloned rule starts with an empty cache.
impl Clone for PatternCache {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl Rule {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The compiled URL pattern under `strategy`, compiling it on first use.
    pub fn compiled_url(&self, strategy: MatchingStrategy) -> Result<&CompiledPattern, PatternError> {
        let slot = match strategy {
            MatchingStrategy::Regexp => &self.match_.compiled.regexp,
            MatchingStrategy::Glob => &self.match_.compiled.glob,
        };
        slot.get_or_init(|| {
            let compiled = CompiledPattern::compile(strategy, &self.match_.url);
            if let Err(e) = &compiled {
                tracing::error!(
                    rule_id = %self.id,
                    pattern = %self.match_.url,
                    strategy = %strategy,
                    error = %e,
                    "Unable to compile rule url pattern"
                );
            }
            compiled
        })
        .as_ref()
        .map_err(|e| e.clone())
    }

    /// Whether this rule covers the request.
    pub fn is_matching(
        &self,
        strategy: MatchingStrategy,
        method: &Method,
        url: &Url,
        protocol: Protocol,
    ) -> Result<bool, PatternError> {
        if self.match_.protocol != protocol || !self.has_method(method) {
            return Ok(false);
        }
        let compiled = self.compiled_url(strategy)?;
        Ok(compiled.is_match(&self.match_target(url)))
    }

    /// Capture groups of the URL pattern against `url`.
    pub fn capture_groups(&self, strategy: MatchingStrategy, url: &Url) -> Result<Vec<String>, PatternError> {
        let compiled = self.compiled_url(strategy)?;
        compiled
            .captures(&self.match_target(url))
            .ok_or_else(|| PatternError::Regex(format!("url {} does not match pattern {}", url, self.match_.url)))
    }

    fn has_method(&self, method: &Method) -> bool {
        self.match_
            .methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method.as_str()))
    }

    /// Path-only patterns match against the path; anything else against
    /// `scheme://host[:port]/path`. The path is percent-decoded and the
    /// query string never takes part.
    fn match_target(&self, url: &Url) -> String {
        let path = decoded_path(url);
        if self.match_.url.starts_with('/') {
            return path;
        }
        let host = url.host_str().unwrap_or_default();
        match url.port() {
            Some(port) => format!("{}://{}:{}{}", url.scheme(), host, port, path),
            None => format!("{}://{}{}", url.scheme(), host, path),
        }
    }
}

/// Percent-decoded path. Escapes that do not decode to UTF-8 are replaced.
fn decoded_path(url: &Url) -> String {
    let path = url.path();
    match urlencoding::decode(path) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(path.as_bytes())).into_owned(),
    }
}
