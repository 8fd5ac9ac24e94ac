//! Error handlers.
//!
//! An error handler renders a pipeline failure into an HTTP response. Which
//! handler runs is decided per failure by the `when` predicates in the
//! handler's configuration (see [`when`]).

pub mod json;
pub mod redirect;
pub mod when;
pub mod www_authenticate;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{AccessRequest, PipelineError};
use crate::rule::Rule;

pub use json::JsonErrorHandler;
pub use redirect::RedirectErrorHandler;
pub use when::When;
pub use www_authenticate::WwwAuthenticateErrorHandler;

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    fn id(&self) -> &str;

    /// Whether the handler is enabled in the process-wide settings.
    fn is_enabled(&self) -> bool;

    fn validate(&self, config: &Value) -> Result<(), PipelineError>;

    /// The `when` predicates of the merged configuration.
    fn when(&self, config: &Value) -> Result<Vec<When>, PipelineError>;

    async fn handle(
        &self,
        cancel: &CancellationToken,
        req: &AccessRequest,
        config: &Value,
        rule: &Rule,
        err: &PipelineError,
    ) -> Result<Response, PipelineError>;
}
