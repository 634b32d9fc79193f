//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config.toml
//!     → loader.rs (read file, deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → schema.rs types, frozen behind Arc for the server's lifetime
//! ```
//!
//! # Design Decisions
//! - Loaded once at startup; the core never re-reads it at runtime
//! - Shared read-only across connections, no locking required
//! - Timeouts configured in seconds, converted once to Duration

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_str, ConfigError};
pub use schema::{
    AppConfig, CgiConfig, LimitsConfig, Redirect, Route, SessionConfig, TimeoutConfig,
    VirtualHost,
};
