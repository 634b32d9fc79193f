//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection bytes
//!     → request.rs (incremental state machine, host resolution, spooling)
//!     → [routing layer picks a handler]
//!     → response.rs (pull-based writer: headers, then one body source)
//!     → Send to client
//! ```

pub mod request;
pub mod response;

pub use request::{header_ignore_case, resolve_host, ParseError, Request, RequestParser};
pub use response::{
    error_response, reason_phrase, redirect_response, success_response, Response,
};
