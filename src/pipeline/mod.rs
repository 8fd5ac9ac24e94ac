//! Access decision pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! matched rule + access request
//!     → authn/ (ordered OR-chain, first responsible authenticator decides)
//!     → authz/ (single authorizer)
//!     → mutate/ (ordered AND-chain, every mutator must succeed)
//!     → AuthenticationSession (subject, extra, output headers)
//!
//! On failure:
//!     → errors/ (rule-level handler selected by `when`, else fallback chain)
//!     → rendered HTTP response
//! ```
//!
//! # Design Decisions
//! - Handlers are resolved by name through [`registry::HandlerRegistry`];
//!   unknown and disabled handlers fail with distinct errors
//! - Handler configuration is the process-wide settings deep-merged with the
//!   rule-level override (see [`config`])
//! - The cancellation token is passed explicitly to every handler call

pub mod authn;
pub mod authz;
pub mod config;
pub mod error;
pub mod errors;
pub mod mutate;
pub mod registry;
pub mod session;
pub mod template;

pub use authn::Authenticator;
pub use authz::Authorizer;
pub use error::{ErrorClass, HandlerKind, PipelineError};
pub use errors::ErrorHandler;
pub use mutate::Mutator;
pub use registry::HandlerRegistry;
pub use session::{AccessRequest, AuthenticationSession, MatchContext};
