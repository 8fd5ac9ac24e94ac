use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::config::ensure_enabled;
use crate::pipeline::mutate::Mutator;
use crate::pipeline::{AccessRequest, AuthenticationSession, HandlerKind, PipelineError};
use crate::rule::Rule;

/// Forwards the original request headers untouched.
#[derive(Debug, Clone)]
pub struct NoopMutator {
    settings: HandlerSettings,
}

impl NoopMutator {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Mutator for NoopMutator {
    fn id(&self) -> &str {
        "noop"
    }

    fn validate(&self, _config: &Value) -> Result<(), PipelineError> {
        ensure_enabled(HandlerKind::Mutator, self.id(), &self.settings)
    }

    async fn mutate(
        &self,
        _cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> Result<(), PipelineError> {
        session.header = req.headers.clone();
        Ok(())
    }
}
