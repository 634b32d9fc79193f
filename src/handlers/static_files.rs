//! Static file serving.
//!
//! # Responsibilities
//! - Map the request path to a file under the route's root
//! - Serve index files and directory listings for directory targets
//! - Pick a Content-Type from the file extension
//!
//! # Design Decisions
//! - Bodies over 1 MiB stay on disk and stream through the file-backed
//!   body source; smaller files are sent from memory
//! - Directory without index and without listing enabled → 403

use std::path::Path;

use crate::config::{Route, VirtualHost};
use crate::http::response::{error_response, Response};
use crate::http::Request;
use crate::routing::matcher;
use crate::security::{resolve_within_root, PathError};

/// Files above this size are served file-backed instead of from memory.
const INLINE_BODY_MAX: u64 = 1024 * 1024;

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
        if route.directory_listing {
            return render_listing(clean_path, &target, host);
        }
        if let Some(index) = &route.index {
            let index_path = target.join(index);
            if !index_path.exists() {
                return error_response(404, "index file not found", Some(host));
            }
            return serve_file(&index_path, host);
        }
        return error_response(403, "directory listing not allowed", Some(host));
    }

    if target.is_file() {
        return serve_file(&target, host);
    }

    error_response(404, "file not found", Some(host))
}

fn serve_file(path: &Path, host: &VirtualHost) -> Response {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut res = Response::new(200);
    res.set_header("Content-Type", content_type(&name));
    res.set_header(
        "Content-Disposition",
        format!("attachment; filename=\"{name}\""),
    );

    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) => return error_response(500, &e.to_string(), Some(host)),
    };

    let result = if size > INLINE_BODY_MAX {
        res.set_body_file(path)
    } else {
        std::fs::read(path).map(|bytes| res.set_body(bytes))
    };
    if let Err(e) = result {
        return error_response(500, &e.to_string(), Some(host));
    }
    res
}

fn render_listing(request_path: &str, dir: &Path, host: &VirtualHost) -> Response {
    let display_path = if request_path.ends_with('/') {
        request_path.to_string()
    } else {
        format!("{request_path}/")
    };

    let mut entries: Vec<(String, bool)> = match std::fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .map(|e| {
                let is_dir = e.file_type().map(|t| t.is_dir()).unwrap_or(false);
                (e.file_name().to_string_lossy().into_owned(), is_dir)
            })
            .collect(),
        Err(e) => return error_response(500, &e.to_string(), Some(host)),
    };
    entries.sort();

    let mut listing = format!(
        "<!DOCTYPE html><html><head><title>Index of {display_path}</title></head><body>\
         <h1>Index of {display_path}</h1><ul>"
    );
    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        listing.push_str(&format!(
            "<li><a href=\"{display_path}{name}{suffix}\">{name}{suffix}</a></li>"
        ));
    }
    listing.push_str("</ul></body></html>");

    let mut res = Response::new(200);
    res.set_header("Content-Type", "text/html; charset=UTF-8");
    res.set_body(listing.into_bytes());
    res
}

/// Content type from the file extension; octet-stream when unknown.
fn content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or("");
    match ext {
        "html" | "htm" => "text/html; charset=UTF-8",
        "css" => "text/css; charset=UTF-8",
        "js" => "application/javascript; charset=UTF-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "json" => "application/json; charset=UTF-8",
        "xml" => "application/xml; charset=UTF-8",
        "pdf" => "application/pdf",
        "txt" => "text/plain; charset=UTF-8",
        _ => "application/octet-stream",
    }
}
