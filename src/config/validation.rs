//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (CGI routes carry a root)
//! - Validate value ranges (ports, redirect codes)
//! - Detect conflicting default servers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashMap;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem found in the configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no servers configured")]
    NoServers,

    #[error("server '{0}' has no ports")]
    NoPorts(String),

    #[error("server '{0}' has no routes")]
    NoRoutes(String),

    #[error("server '{server}': route path '{path}' must start with '/'")]
    BadRoutePath { server: String, path: String },

    #[error("server '{server}': redirect code {code} is not a 3xx status")]
    BadRedirectCode { server: String, code: u16 },

    #[error("server '{server}': CGI route '{path}' has no root directory")]
    CgiWithoutRoot { server: String, path: String },

    #[error("port {port} has more than one default server")]
    DuplicateDefault { port: u16 },
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.servers.is_empty() {
        errors.push(ValidationError::NoServers);
    }

    let mut defaults_per_port: HashMap<u16, u32> = HashMap::new();

    for server in &config.servers {
        if server.ports.is_empty() {
            errors.push(ValidationError::NoPorts(server.name.clone()));
        }
        if server.routes.is_empty() {
            errors.push(ValidationError::NoRoutes(server.name.clone()));
        }
        if server.default_server {
            for port in &server.ports {
                *defaults_per_port.entry(*port).or_insert(0) += 1;
            }
        }

        for route in &server.routes {
            if !route.path.starts_with('/') {
                errors.push(ValidationError::BadRoutePath {
                    server: server.name.clone(),
                    path: route.path.clone(),
                });
            }
            if let Some(redirect) = &route.redirect {
                if !(300..400).contains(&redirect.code) {
                    errors.push(ValidationError::BadRedirectCode {
                        server: server.name.clone(),
                        code: redirect.code,
                    });
                }
            }
            if route.cgi.is_some() && route.root.is_none() {
                errors.push(ValidationError::CgiWithoutRoot {
                    server: server.name.clone(),
                    path: route.path.clone(),
                });
            }
        }
    }

    for (port, count) in defaults_per_port {
        if count > 1 {
            errors.push(ValidationError::DuplicateDefault { port });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Redirect, Route, VirtualHost};

    fn host(name: &str, port: u16, default: bool, routes: Vec<Route>) -> VirtualHost {
        VirtualHost {
            name: name.to_string(),
            host: "127.0.0.1".to_string(),
            ports: vec![port],
            default_server: default,
            client_max_body_size: 1024,
            error_pages: Default::default(),
            routes,
        }
    }

    fn route(path: &str) -> Route {
        Route {
            path: path.to_string(),
            root: Some("/tmp".to_string()),
            methods: None,
            index: None,
            directory_listing: false,
            upload_dir: None,
            cgi: None,
            redirect: None,
        }
    }

    #[test]
    fn empty_config_rejected() {
        let errors = validate_config(&AppConfig::default()).unwrap_err();
        assert!(errors.contains(&ValidationError::NoServers));
    }

    #[test]
    fn valid_config_accepted() {
        let cfg = AppConfig {
            servers: vec![host("a", 8080, true, vec![route("/")])],
            ..Default::default()
        };
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn collects_multiple_errors() {
        let mut bad = route("no-slash");
        bad.redirect = Some(Redirect {
            code: 200,
            location: "/".to_string(),
        });
        let cfg = AppConfig {
            servers: vec![
                host("a", 8080, true, vec![bad]),
                host("b", 8080, true, vec![route("/")]),
            ],
            ..Default::default()
        };
        let errors = validate_config(&cfg).unwrap_err();
        assert!(errors.len() >= 3);
        assert!(errors.contains(&ValidationError::DuplicateDefault { port: 8080 }));
    }
}
