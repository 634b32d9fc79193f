//! DELETE handler.
//!
//! Removes a single file under the route's root. Directories are never
//! removed; a DELETE on a directory path reports 403.

use std::path::Path;

use crate::config::{Route, VirtualHost};
use crate::http::response::{error_response, success_response, Response};
use crate::http::Request;
use crate::routing::matcher;
use crate::security::{resolve_within_root, PathError};

pub fn handle(request: &Request, route: &Route, host: &VirtualHost) -> Response {
    let root = match &route.root {
        Some(root) => Path::new(root),
        None => return error_response(500, "no root directory defined", Some(host)),
    };

    let clean_path = matcher::strip_query(&request.path);
    let rel = matcher::strip_route_prefix(route, clean_path);

    let target = match resolve_within_root(root, rel) {
        Ok(p) => p,
        Err(PathError::Traversal) => {
            return error_response(403, "access denied", Some(host));
        }
        Err(_) => return error_response(500, "root directory unavailable", Some(host)),
    };

    if target.is_dir() {
        return error_response(403, "cannot delete a directory", Some(host));
    }
    if !target.exists() {
        return error_response(404, "file not found", Some(host));
    }

    match std::fs::remove_file(&target) {
        Ok(()) => {
            tracing::info!(path = %target.display(), "file deleted");
            success_response(200, "Deleted")
        }
        Err(e) => error_response(500, &e.to_string(), Some(host)),
    }
}
