//! Gatekeeper: an identity and access proxy.
//!
//! Every request is matched to exactly one access rule, then run through
//! the rule's authenticators, authorizer and mutators. Granted requests
//! are either forwarded to the rule's upstream (reverse-proxy mode) or
//! answered with the headers to forward (decision API for an external
//! proxy). Failures are rendered by a selectable error handler.

// Core subsystems
pub mod config;
pub mod pipeline;
pub mod rule;

// Surfaces
pub mod api;
pub mod http;
pub mod proxy;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::GatekeeperConfig;
pub use http::{AppState, GatekeeperServer};
pub use lifecycle::Shutdown;
pub use pipeline::{AuthenticationSession, PipelineError};
pub use rule::{Rule, RuleRepository};
