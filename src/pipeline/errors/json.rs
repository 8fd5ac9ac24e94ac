use async_trait::async_trait;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::http::response::error_response;
use crate::pipeline::config::{decode, ensure_enabled};
use crate::pipeline::errors::{ErrorHandler, When};
use crate::pipeline::{AccessRequest, HandlerKind, PipelineError};
use crate::rule::Rule;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsonConfig {
    /// Expose the failure message instead of a generic one.
    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub when: Vec<When>,
}

/// Renders failures as a JSON error envelope with the failure's status.
#[derive(Debug, Clone)]
pub struct JsonErrorHandler {
    settings: HandlerSettings,
}

impl JsonErrorHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    fn config(&self, overlay: &Value) -> Result<JsonConfig, PipelineError> {
        decode(HandlerKind::ErrorHandler, self.id(), &self.settings, overlay)
    }
}

#[async_trait]
impl ErrorHandler for JsonErrorHandler {
    fn id(&self) -> &str {
        "json"
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
        _req: &AccessRequest,
        config: &Value,
        _rule: &Rule,
        err: &PipelineError,
    ) -> Result<Response, PipelineError> {
        let config = self.config(config)?;
        Ok(error_response(err, config.verbose))
    }
}
