//! Asks the client for HTTP basic credentials.

use async_trait::async_trait;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::HandlerSettings;
use crate::pipeline::config::{decode, ensure_enabled};
use crate::pipeline::errors::{ErrorHandler, When};
use crate::pipeline::{AccessRequest, HandlerKind, PipelineError};
use crate::rule::Rule;

const DEFAULT_REALM: &str = "Please authenticate.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WwwAuthenticateConfig {
    #[serde(default)]
    pub realm: String,

    #[serde(default)]
    pub when: Vec<When>,
}

#[derive(Debug, Clone)]
pub struct WwwAuthenticateErrorHandler {
    settings: HandlerSettings,
}

impl WwwAuthenticateErrorHandler {
    pub fn new(settings: HandlerSettings) -> Self {
        Self { settings }
    }

    fn config(&self, overlay: &Value) -> Result<WwwAuthenticateConfig, PipelineError> {
        let mut config: WwwAuthenticateConfig = decode(HandlerKind::ErrorHandler, self.id(), &self.settings, overlay)?;
        if config.realm.is_empty() {
            config.realm = DEFAULT_REALM.to_string();
        }
        Ok(config)
    }
}

#[async_trait]
impl ErrorHandler for WwwAuthenticateErrorHandler {
    fn id(&self) -> &str {
        "www_authenticate"
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
        _err: &PipelineError,
    ) -> Result<Response, PipelineError> {
        let config = self.config(config)?;
        Ok((
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, format!("Basic realm={}", config.realm))],
            "Unauthorized\n",
        )
            .into_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;
    use url::Url;

    async fn realm_of(handler: &WwwAuthenticateErrorHandler, config: Value) -> String {
        let req = AccessRequest::new(Method::GET, Url::parse("http://localhost/").unwrap());
        let response = handler
            .handle(
                &CancellationToken::new(),
                &req,
                &config,
                &Rule::default(),
                &PipelineError::Forbidden("x".into()),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_realm() {
        let handler = WwwAuthenticateErrorHandler::new(HandlerSettings::enabled());
        assert_eq!(realm_of(&handler, Value::Null).await, "Basic realm=Please authenticate.");
        assert_eq!(realm_of(&handler, json!({"realm": "foobar"})).await, "Basic realm=foobar");
    }
}
