//! Request handlers.
//!
//! # Data Flow
//! ```text
//! routing::dispatch
//!     → static_files.rs (GET file/directory serving)
//!     → upload.rs (POST multipart file storage)
//!     → delete.rs (DELETE file removal)
//! ```
//!
//! Each handler is a pure function over (request, route, host) and
//! returns a finished Response; the CGI gateway lives in `crate::cgi`
//! because it is the one handler that needs the async runtime.

pub mod delete;
pub mod static_files;
pub mod upload;
