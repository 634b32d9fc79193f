//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Parsed request + resolved virtual host
//!     → router.rs (dispatch order, error statuses)
//!     → matcher.rs (longest-prefix route selection)
//!     → Return: Response, or a deferred CGI job
//! ```
//!
//! # Design Decisions
//! - Route table immutable at runtime, shared via Arc
//! - Longest matching prefix wins; "/" is the catch-all
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod router;

pub use router::{dispatch, Dispatch};
