//! Authenticators.
//!
//! An authenticator inspects the request and either establishes the
//! session's subject, declares itself not responsible
//! ([`PipelineError::NotResponsible`]) so the next one is tried, or denies
//! the request outright with any other error.

pub mod anonymous;
pub mod noop;
pub mod unauthorized;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{AccessRequest, AuthenticationSession, PipelineError};
use crate::rule::Rule;

pub use anonymous::AnonymousAuthenticator;
pub use noop::NoopAuthenticator;
pub use unauthorized::UnauthorizedAuthenticator;

#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Registry name.
    fn id(&self) -> &str;

    /// Check that the handler is enabled and `config` (the rule-level
    /// override) resolves to a valid configuration.
    fn validate(&self, config: &Value) -> Result<(), PipelineError>;

    async fn authenticate(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> Result<(), PipelineError>;
}
