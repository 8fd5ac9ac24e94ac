//! HTTP surfaces.
//!
//! # Data Flow
//! ```text
//! API listener                         Proxy listener
//!     → server.rs (api_router)             → server.rs (proxy_router)
//!     → request.rs (request id)            → request.rs (request id)
//!     → api::decision / rules / health     → proxy::forward
//!     → response.rs (error envelope)       → response.rs (hop-by-hop)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::X_REQUEST_ID;
pub use server::{AppState, GatekeeperServer, InnerState};
