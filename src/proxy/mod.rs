//! Request evaluation and reverse proxying.
//!
//! # Data Flow
//! ```text
//! AccessRequest
//!     → rule::Matcher (exactly one rule)
//!     → request_handler.rs (authn → authz → mutate, or error handler)
//!     → forward.rs (rewrite onto the upstream, send, relay response)
//! ```

pub mod forward;
pub mod request_handler;
pub mod upstream;

pub use request_handler::RequestHandler;
pub use upstream::{configure_backend_url, UpstreamTarget};
