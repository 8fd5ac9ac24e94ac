use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::authz::Authorizer;
use crate::pipeline::config::ensure_enabled;
use crate::pipeline::{AccessRequest, AuthenticationSession, HandlerKind, PipelineError};
use crate::rule::Rule;

/// Permits every authenticated request.
#[derive(Debug, Clone)]
pub struct AllowAuthorizer {
    settings: HandlerSettings,
}

impl AllowAuthorizer {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Authorizer for AllowAuthorizer {
    fn id(&self) -> &str {
        "allow"
    }

    fn validate(&self, _config: &Value) -> Result<(), PipelineError> {
        ensure_enabled(HandlerKind::Authorizer, self.id(), &self.settings)
    }

    async fn authorize(
        &self,
        _cancel: &CancellationToken,
        _req: &AccessRequest,
        _session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}
