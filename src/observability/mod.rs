//! Observability subsystem.
//!
//! Every subsystem logs through `tracing`; logging.rs installs the
//! subscriber. Access decisions are logged by the request handler with
//! the request, the rule, and for denials the stage, handler and reason.

pub mod logging;
