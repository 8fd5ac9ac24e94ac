//! Anonymous authenticator.
//!
//! Responsible only for requests without an `Authorization` header; those
//! get a fixed subject (`anonymous` unless configured otherwise).

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::authn::Authenticator;
use crate::pipeline::config::{decode, ensure_enabled};
use crate::pipeline::{AccessRequest, AuthenticationSession, HandlerKind, PipelineError};
use crate::rule::Rule;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnonymousConfig {
    #[serde(default = "default_subject")]
    pub subject: String,
}

fn default_subject() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Clone)]
pub struct AnonymousAuthenticator {
    settings: HandlerSettings,
}

impl AnonymousAuthenticator {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    fn config(&self, overlay: &Value) -> Result<AnonymousConfig, PipelineError> {
        ensure_enabled(HandlerKind::Authenticator, self.id(), &self.settings)?;
        decode(HandlerKind::Authenticator, self.id(), &self.settings, overlay)
    }
}

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    fn id(&self) -> &str {
        "anonymous"
    }

    fn validate(&self, config: &Value) -> Result<(), PipelineError> {
        self.config(config).map(|_| ())
    }

    async fn authenticate(
        &self,
        _cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> Result<(), PipelineError> {
        let has_credentials = req
            .headers
            .get(AUTHORIZATION)
            .is_some_and(|v| !v.is_empty());
        if has_credentials {
            return Err(PipelineError::NotResponsible);
        }

        session.subject = self.config(config)?.subject;
        Ok(())
    }
}
