//! Access rule subsystem.
//!
//! # Data Flow
//! ```text
//! rule files (JSON)
//!     → loader.rs (read & deserialize)
//!     → validator.rs (log misconfigured rules, keep them)
//!     → repository.rs (immutable set, swapped with the server state)
//!
//! Per request:
//!     matcher.rs (exactly one rule for method + url + protocol)
//!     → engine.rs (regexp / glob patterns, compiled once per rule)
//! ```

pub mod engine;
pub mod loader;
pub mod matcher;
pub mod model;
pub mod repository;
pub mod validator;

pub use engine::MatchingStrategy;
pub use matcher::Matcher;
pub use model::{Protocol, Rule, RuleHandler, RuleMatch, Upstream};
pub use repository::RuleRepository;
