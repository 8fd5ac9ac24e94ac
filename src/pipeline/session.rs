//! Per-request evaluation state.
//!
//! # Ownership
//! An [`AuthenticationSession`] is created by the executor for exactly one
//! request and mutated strictly in stage order (authn, authz, mutate). It is
//! never shared between tasks, so it carries no synchronization.

use std::net::SocketAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::{Map, Value};
use url::Url;

use crate::pipeline::PipelineError;

/// The request as the pipeline sees it.
///
/// Entry points build this from the inbound HTTP request after resolving any
/// forwarded method/scheme/host/uri overrides.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
}

impl AccessRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn user_agent(&self) -> &str {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// `host[:port]` of the effective URL.
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => String::new(),
        }
    }
}

/// Read-only facts about how the request matched its rule.
#[derive(Debug, Clone)]
pub struct MatchContext {
    /// Capture groups of the rule's URL pattern, in order. Empty for glob rules.
    pub capture_groups: Vec<String>,
    pub url: Url,
    pub method: Method,
    pub header: HeaderMap,
}

impl MatchContext {
    pub fn from_request(req: &AccessRequest, capture_groups: Vec<String>) -> Self {
        Self {
            capture_groups,
            url: req.url.clone(),
            method: req.method.clone(),
            header: req.headers.clone(),
        }
    }
}

/// Identity and output headers accumulated while a rule's handlers run.
#[derive(Debug, Clone)]
pub struct AuthenticationSession {
    pub subject: String,
    pub extra: Map<String, Value>,
    pub header: HeaderMap,
    pub match_context: MatchContext,
}

impl AuthenticationSession {
    pub fn new(match_context: MatchContext) -> Self {
        Self {
            subject: String::new(),
            extra: Map::new(),
            header: HeaderMap::new(),
            match_context,
        }
    }

    /// Set (replace) an output header.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), PipelineError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| PipelineError::Internal(format!("invalid header name \"{}\": {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| PipelineError::Internal(format!("invalid value for header \"{}\": {}", name, e)))?;
        self.header.insert(name, value);
        Ok(())
    }
}
