use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::authn::Authenticator;
use crate::pipeline::config::ensure_enabled;
use crate::pipeline::{AccessRequest, AuthenticationSession, HandlerKind, PipelineError};
use crate::rule::Rule;

/// Denies every request.
#[derive(Debug, Clone)]
pub struct UnauthorizedAuthenticator {
    settings: HandlerSettings,
}

impl UnauthorizedAuthenticator {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Authenticator for UnauthorizedAuthenticator {
    fn id(&self) -> &str {
        "unauthorized"
    }

    fn validate(&self, _config: &Value) -> Result<(), PipelineError> {
        ensure_enabled(HandlerKind::Authenticator, self.id(), &self.settings)
    }

    async fn authenticate(
        &self,
        _cancel: &CancellationToken,
        _req: &AccessRequest,
        _session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::Unauthorized(
            "authentication is not possible for this request".to_string(),
        ))
    }
}
