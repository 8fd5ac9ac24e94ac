//! Redirects the client, e.g. to a login page, optionally carrying the
//! original URL in a query parameter.

use async_trait::async_trait;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::HandlerSettings;
use crate::pipeline::config::{decode, ensure_enabled};
use crate::pipeline::errors::{ErrorHandler, When};
use crate::pipeline::{AccessRequest, HandlerKind, PipelineError};
use crate::rule::Rule;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedirectConfig {
    pub to: String,

    /// 301 or 302; anything else falls back to 302.
    #[serde(default)]
    pub code: u16,

    #[serde(default)]
    pub return_to_query_param: String,

    #[serde(default)]
    pub when: Vec<When>,
}

impl RedirectConfig {
    fn status(&self) -> StatusCode {
        match self.code {
            301 => StatusCode::MOVED_PERMANENTLY,
            _ => StatusCode::FOUND,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedirectErrorHandler {
    settings: HandlerSettings,
}

impl RedirectErrorHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    fn config(&self, overlay: &Value) -> Result<RedirectConfig, PipelineError> {
        decode(HandlerKind::ErrorHandler, self.id(), &self.settings, overlay)
    }
}

/// The URL the client originally asked for, as seen by the edge proxy.
fn original_url(req: &AccessRequest) -> Url {
    let mut url = req.url.clone();
    if let Some(proto) = req.header("x-forwarded-proto").filter(|v| !v.is_empty()) {
        // Rejected scheme changes (e.g. http -> custom) keep the original.
        let _ = url.set_scheme(proto);
    }
    if let Some(host) = req.header("x-forwarded-host").filter(|v| !v.is_empty()) {
        if let Ok(parsed) = Url::parse(&format!("{}://{}", url.scheme(), host)) {
            let _ = url.set_host(parsed.host_str());
            let _ = url.set_port(parsed.port());
        }
    }
    if let Some(uri) = req.header("x-forwarded-uri").filter(|v| !v.is_empty()) {
        match uri.split_once('?') {
            Some((path, query)) => {
                url.set_path(path);
                url.set_query(Some(query));
            }
            None => url.set_path(uri),
        }
    }
    url
}

/// `to`, with `return_to_query_param` set to `original` when configured.
pub fn redirect_url(config: &RedirectConfig, original: &Url) -> String {
    if config.return_to_query_param.is_empty() {
        return config.to.clone();
    }
    match Url::parse(&config.to) {
        Ok(mut to) => {
            let kept: Vec<(String, String)> = to
                .query_pairs()
                .filter(|(k, _)| *k != config.return_to_query_param.as_str())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            to.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(&config.return_to_query_param, original.as_str());
            to.to_string()
        }
        Err(_) => config.to.clone(),
    }
}

#[async_trait]
impl ErrorHandler for RedirectErrorHandler {
    fn id(&self) -> &str {
        "redirect"
    }

    fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    fn validate(&self, config: &Value) -> Result<(), PipelineError> {
        ensure_enabled(HandlerKind::ErrorHandler, self.id(), &self.settings)?;
        self.config(config).map(|_| ())
    }

    fn when(&self, config: &Value) -> Result<Vec<When>, PipelineError> {
        self.config(config).map(|c| c.when)
    }

    async fn handle(
        &self,
        _cancel: &CancellationToken,
        req: &AccessRequest,
        config: &Value,
        _rule: &Rule,
        _err: &PipelineError,
    ) -> Result<Response, PipelineError> {
        let config = self.config(config)?;
        let location = redirect_url(&config, &original_url(req));
        let location = HeaderValue::from_str(&location)
            .map_err(|e| PipelineError::Internal(format!("invalid redirect location \"{}\": {}", location, e)))?;
        Ok((config.status(), [(header::LOCATION, location)]).into_response())
    }
}
