//! Mutators.
//!
//! Mutators turn the authenticated session into what the upstream sees,
//! usually by writing headers into the session. Every mutator of a rule
//! must succeed.

pub mod header;
pub mod noop;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{AccessRequest, AuthenticationSession, PipelineError};
use crate::rule::Rule;

pub use header::HeaderMutator;
pub use noop::NoopMutator;

#[async_trait]
pub trait Mutator: Send + Sync {
    fn id(&self) -> &str;

    fn validate(&self, config: &Value) -> Result<(), PipelineError>;

    async fn mutate(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> Result<(), PipelineError>;
}
