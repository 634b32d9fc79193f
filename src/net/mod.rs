//! Networking subsystem.
//!
//! # Data Flow
//! ```text
//! Configuration
//!     → listener.rs (bind per port, accept, backpressure)
//!     → connection.rs (per-task request/response loop)
//! ```

pub mod connection;
pub mod listener;

pub use listener::{Server, ServerError};
