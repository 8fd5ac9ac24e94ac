//! Authorizers.
//!
//! Exactly one authorizer runs per rule. Any error it returns is the final
//! decision for the request.

pub mod allow;
pub mod deny;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{AccessRequest, AuthenticationSession, PipelineError};
use crate::rule::Rule;

pub use allow::AllowAuthorizer;
pub use deny::DenyAuthorizer;

#[async_trait]
pub trait Authorizer: Send + Sync {
    fn id(&self) -> &str;

    fn validate(&self, config: &Value) -> Result<(), PipelineError>;

    async fn authorize(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> Result<(), PipelineError>;
}
