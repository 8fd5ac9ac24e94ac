//! Header mutator: sets templated headers on the session.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::config::{decode, ensure_enabled};
use crate::pipeline::mutate::Mutator;
use crate::pipeline::template::render;
use crate::pipeline::{AccessRequest, AuthenticationSession, HandlerKind, PipelineError};
use crate::rule::Rule;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderConfig {
    /// Header name to template. Applied in name order.
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct HeaderMutator {
    settings: HandlerSettings,
}

impl HeaderMutator {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    fn config(&self, overlay: &Value) -> Result<HeaderConfig, PipelineError> {
        ensure_enabled(HandlerKind::Mutator, self.id(), &self.settings)?;
        decode(HandlerKind::Mutator, self.id(), &self.settings, overlay)
    }
}

#[async_trait]
impl Mutator for HeaderMutator {
    fn id(&self) -> &str {
        "header"
    }

    fn validate(&self, config: &Value) -> Result<(), PipelineError> {
        self.config(config).map(|_| ())
    }

    async fn mutate(
        &self,
        _cancel: &CancellationToken,
        _req: &AccessRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> Result<(), PipelineError> {
        let config = self.config(config)?;
        for (name, template) in &config.headers {
            let value = render(template, session).map_err(|e| {
                PipelineError::Internal(format!("unable to render header \"{}\": {}", name, e))
            })?;
            session.set_header(name, &value)?;
        }
        Ok(())
    }
}
