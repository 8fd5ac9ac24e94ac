//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatekeeperConfig (validated, immutable)
//!     → handler registry + rule repository built from it
//!
//! On change:
//!     watcher.rs detects a config or rule file change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → AppState::reload swaps registry, handler and rules atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - An invalid reload keeps the running configuration

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{GatekeeperConfig, HandlerSettings, LogConfig, LogFormat};
pub use watcher::ConfigWatcher;
