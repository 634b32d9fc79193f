//! vhostd
//!
//! A multi-virtual-host HTTP/1.1 server built with Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────┐
//!                      │                   SERVER                     │
//!                      │                                              │
//!   Client Request     │  ┌─────────┐   ┌─────────┐   ┌───────────┐  │
//!   ───────────────────┼─▶│   net   │──▶│  http   │──▶│  routing  │  │
//!                      │  │listener │   │ parser  │   │  engine   │  │
//!                      │  └─────────┘   └─────────┘   └─────┬─────┘  │
//!                      │                                    │        │
//!                      │              ┌─────────────────────┼──────┐ │
//!                      │              ▼          ▼          ▼      │ │
//!                      │        ┌──────────┐ ┌───────┐ ┌────────┐  │ │
//!                      │        │ handlers │ │  cgi  │ │redirect│  │ │
//!                      │        │static/up/│ │gateway│ │        │  │ │
//!                      │        │  delete  │ └───────┘ └────────┘  │ │
//!                      │        └──────────┘                       │ │
//!   Client Response    │  ┌─────────┐   ┌──────────┐               │ │
//!   ◀──────────────────┼──│response │◀──│ response │◀──────────────┘ │
//!                      │  │ writer  │   │ builder  │                 │
//!                      │  └─────────┘   └──────────┘                 │
//!                      │                                             │
//!                      │  ┌─────────────────────────────────────────┐│
//!                      │  │          Cross-Cutting Concerns          ││
//!                      │  │  ┌────────┐ ┌─────────┐ ┌─────────────┐ ││
//!                      │  │  │ config │ │ session │ │  security   │ ││
//!                      │  │  └────────┘ └─────────┘ └─────────────┘ ││
//!                      │  └─────────────────────────────────────────┘│
//!                      └──────────────────────────────────────────────┘
//! ```
//!
//! Every accepted connection runs on its own task: read, parse
//! incrementally, route, run a handler or the CGI gateway, write the
//! response chunk by chunk, then loop for keep-alive.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;

// Request handling
pub mod cgi;
pub mod handlers;

// Cross-cutting concerns
pub mod security;
pub mod session;

pub use config::{load_config, AppConfig, ConfigError};
pub use net::Server;
