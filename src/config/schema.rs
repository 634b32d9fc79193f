//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration: global limits plus the ordered virtual-host table.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Parser and connection limits.
    pub limits: LimitsConfig,

    /// Timeout configuration. All values are seconds.
    pub timeouts: TimeoutConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Virtual host definitions. Order matters: the first host bound to a
    /// port is the fallback when no name matches and none is flagged default.
    pub servers: Vec<VirtualHost>,
}

/// Parser and connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of the request line + headers in bytes.
    pub max_header_bytes: usize,

    /// Maximum concurrent connections across all listeners (backpressure).
    pub max_connections: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for the phases of a connection.
///
/// Values are seconds and converted exactly once with `Duration::from_secs`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to receive the full header section.
    pub header_secs: u64,

    /// Time allowed to receive the body and write the response.
    pub body_secs: u64,

    /// Idle keep-alive timeout between requests.
    pub idle_secs: u64,

    /// Wall-clock budget for a CGI subprocess.
    pub cgi_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            header_secs: 10,
            body_secs: 30,
            idle_secs: 60,
            cgi_secs: 10,
        }
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name carrying the session id.
    pub cookie_name: String,

    /// Session lifetime in seconds.
    pub max_age_secs: u64,

    /// Interval between expired-session sweeps in seconds.
    pub sweep_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            max_age_secs: 3600,
            sweep_secs: 60,
        }
    }
}

/// A named virtual host bound to one or more ports.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualHost {
    /// Server name matched against the Host header.
    pub name: String,

    /// Address to bind listeners on (e.g. "127.0.0.1").
    #[serde(default = "default_bind_host")]
    pub host: String,

    /// Ports this host is reachable on.
    pub ports: Vec<u16>,

    /// Chosen when the Host header matches no configured name.
    #[serde(default)]
    pub default_server: bool,

    /// Maximum accepted request body size in bytes.
    #[serde(default = "default_max_body")]
    pub client_max_body_size: u64,

    /// Status code → error page file path overrides. TOML table keys are
    /// strings, so codes are stored as written ("404").
    #[serde(default)]
    pub error_pages: HashMap<String, String>,

    /// Ordered route table.
    pub routes: Vec<Route>,
}

impl VirtualHost {
    /// Error page file configured for a status code, if any.
    pub fn error_page(&self, status: u16) -> Option<&str> {
        self.error_pages.get(&status.to_string()).map(|s| s.as_str())
    }
}

fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_body() -> u64 {
    1024 * 1024
}

/// A path-prefix rule describing how matching requests are served.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Route {
    /// Path prefix to match ("/" matches everything).
    pub path: String,

    /// Document root for static serving, CGI, and deletes.
    #[serde(default)]
    pub root: Option<String>,

    /// Allowed methods. Absent or empty = all methods allowed.
    #[serde(default)]
    pub methods: Option<Vec<String>>,

    /// Index file served for directory requests.
    #[serde(default)]
    pub index: Option<String>,

    /// Render a directory listing when no index applies.
    #[serde(default)]
    pub directory_listing: bool,

    /// Destination directory for multipart uploads.
    #[serde(default)]
    pub upload_dir: Option<String>,

    /// CGI dispatch for this route. Mutually exclusive with static serving.
    #[serde(default)]
    pub cgi: Option<CgiConfig>,

    /// Redirect rule. Takes priority over every other action.
    #[serde(default)]
    pub redirect: Option<Redirect>,
}

impl Route {
    /// True when the request method is allowed on this route.
    pub fn allows_method(&self, method: &str) -> bool {
        match &self.methods {
            Some(methods) if !methods.is_empty() => {
                methods.iter().any(|m| m.eq_ignore_ascii_case(method))
            }
            _ => true,
        }
    }
}

/// CGI dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CgiConfig {
    /// Script extension this route executes (e.g. ".py"). Paths with any
    /// other extension are not treated as scripts. Empty = no filter.
    #[serde(default)]
    pub extension: String,

    /// Interpreter executed against the script.
    pub interpreter: String,
}

/// Redirect rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Redirect {
    /// Redirect status code (3xx).
    pub code: u16,

    /// Location header value.
    pub location: String,
}
