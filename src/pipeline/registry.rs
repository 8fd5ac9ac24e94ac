//! Handler registry.
//!
//! # Responsibilities
//! - Name → instance lookup for the four handler kinds
//! - Build the built-in handlers from the process configuration
//!
//! # Design Decisions
//! - Lookups fail with `UnknownHandler`; disabled handlers are still
//!   registered and fail later, in `validate`, with `HandlerDisabled`
//! - A registry is immutable once built; a config reload builds a new one

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GatekeeperConfig;
use crate::pipeline::authn::{AnonymousAuthenticator, NoopAuthenticator, UnauthorizedAuthenticator};
use crate::pipeline::authz::{AllowAuthorizer, DenyAuthorizer};
use crate::pipeline::errors::{JsonErrorHandler, RedirectErrorHandler, WwwAuthenticateErrorHandler};
use crate::pipeline::mutate::{HeaderMutator, NoopMutator};
use crate::pipeline::{Authenticator, Authorizer, ErrorHandler, HandlerKind, Mutator, PipelineError};

pub const BUILTIN_AUTHENTICATORS: [&str; 3] = ["anonymous", "noop", "unauthorized"];
pub const BUILTIN_AUTHORIZERS: [&str; 2] = ["allow", "deny"];
pub const BUILTIN_MUTATORS: [&str; 2] = ["header", "noop"];
pub const BUILTIN_ERROR_HANDLERS: [&str; 3] = ["json", "redirect", "www_authenticate"];

/// Built-in handler names of one kind.
pub fn builtin_names(kind: HandlerKind) -> &'static [&'static str] {
    match kind {
        HandlerKind::Authenticator => &BUILTIN_AUTHENTICATORS,
        HandlerKind::Authorizer => &BUILTIN_AUTHORIZERS,
        HandlerKind::Mutator => &BUILTIN_MUTATORS,
        HandlerKind::ErrorHandler => &BUILTIN_ERROR_HANDLERS,
    }
}

#[derive(Default)]
pub struct HandlerRegistry {
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
    mutators: HashMap<String, Arc<dyn Mutator>>,
    error_handlers: HashMap<String, Arc<dyn ErrorHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("authenticators", &self.authenticators.keys().collect::<Vec<_>>())
            .field("authorizers", &self.authorizers.keys().collect::<Vec<_>>())
            .field("mutators", &self.mutators.keys().collect::<Vec<_>>())
            .field("error_handlers", &self.error_handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every built-in handler with its settings from `config`.
    pub fn from_config(config: &GatekeeperConfig) -> Self {
        let settings = |kind: HandlerKind, id: &str| config.handler_settings(kind, id);
        let mut registry = Self::new();

        registry.register_authenticator(Arc::new(AnonymousAuthenticator::new(settings(
            HandlerKind::Authenticator,
            "anonymous",
        ))));
        registry.register_authenticator(Arc::new(NoopAuthenticator::new(settings(HandlerKind::Authenticator, "noop"))));
        registry.register_authenticator(Arc::new(UnauthorizedAuthenticator::new(settings(
            HandlerKind::Authenticator,
            "unauthorized",
        ))));

        registry.register_authorizer(Arc::new(AllowAuthorizer::new(settings(HandlerKind::Authorizer, "allow"))));
        registry.register_authorizer(Arc::new(DenyAuthorizer::new(settings(HandlerKind::Authorizer, "deny"))));

        registry.register_mutator(Arc::new(HeaderMutator::new(settings(HandlerKind::Mutator, "header"))));
        registry.register_mutator(Arc::new(NoopMutator::new(settings(HandlerKind::Mutator, "noop"))));

        registry.register_error_handler(Arc::new(JsonErrorHandler::new(settings(HandlerKind::ErrorHandler, "json"))));
        registry.register_error_handler(Arc::new(RedirectErrorHandler::new(settings(
            HandlerKind::ErrorHandler,
            "redirect",
        ))));
        registry.register_error_handler(Arc::new(WwwAuthenticateErrorHandler::new(settings(
            HandlerKind::ErrorHandler,
            "www_authenticate",
        ))));

        tracing::debug!(registry = ?registry, "Handler registry built");
        registry
    }

    pub fn register_authenticator(&mut self, handler: Arc<dyn Authenticator>) {
        self.authenticators.insert(handler.id().to_string(), handler);
    }

    pub fn register_authorizer(&mut self, handler: Arc<dyn Authorizer>) {
        self.authorizers.insert(handler.id().to_string(), handler);
    }

    pub fn register_mutator(&mut self, handler: Arc<dyn Mutator>) {
        self.mutators.insert(handler.id().to_string(), handler);
    }

    pub fn register_error_handler(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.error_handlers.insert(handler.id().to_string(), handler);
    }

    pub fn authenticator(&self, id: &str) -> Result<Arc<dyn Authenticator>, PipelineError> {
        self.authenticators
            .get(id)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::Authenticator, id))
    }

    pub fn authorizer(&self, id: &str) -> Result<Arc<dyn Authorizer>, PipelineError> {
        self.authorizers
            .get(id)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::Authorizer, id))
    }

    pub fn mutator(&self, id: &str) -> Result<Arc<dyn Mutator>, PipelineError> {
        self.mutators.get(id).cloned().ok_or_else(|| unknown(HandlerKind::Mutator, id))
    }

    pub fn error_handler(&self, id: &str) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        self.error_handlers
            .get(id)
            .cloned()
            .ok_or_else(|| unknown(HandlerKind::ErrorHandler, id))
    }
}

fn unknown(kind: HandlerKind, id: &str) -> PipelineError {
    PipelineError::UnknownHandler {
        kind,
        id: id.to_string(),
    }
}
