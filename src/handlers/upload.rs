//! Multipart file uploads.
//!
//! # Responsibilities
//! - Accept POST multipart/form-data bodies from the spool file
//! - Write each file part under the route's upload directory
//! - Reject anything that is not a well-formed multipart body
//!
//! # Design Decisions
//! - Filenames are reduced to their final path component before writing,
//!   so a crafted filename cannot place files outside the upload dir
//! - Non-file parts are parsed and discarded

use std::path::Path;

use crate::config::{Route, VirtualHost};
use crate::http::response::{error_response, success_response, Response};
use crate::http::Request;

pub fn handle(request: &Request, route: &Route, host: &VirtualHost) -> Response {
    if request.method != "POST" {
        return error_response(405, "only POST allowed", Some(host));
    }

    let content_type = match request.header("Content-Type") {
        Some(ct) if ct.contains("multipart/form-data") => ct,
        _ => return error_response(415, "expected multipart/form-data", Some(host)),
    };

    let boundary = match extract_boundary(content_type) {
        Some(b) if !b.is_empty() => b,
        _ => return error_response(400, "missing boundary", Some(host)),
    };

    let spool = match &request.body {
        Some(spool) => spool,
        None => return error_response(400, "empty upload body", Some(host)),
    };
    let body = match std::fs::read(spool.path()) {
        Ok(bytes) => bytes,
        Err(e) => return error_response(500, &e.to_string(), Some(host)),
    };

    let upload_dir = match &route.upload_dir {
        Some(dir) => Path::new(dir),
        None => return error_response(500, "no upload directory defined", Some(host)),
    };
    if let Err(e) = std::fs::create_dir_all(upload_dir) {
        return error_response(500, &e.to_string(), Some(host));
    }

    let delimiter = format!("--{boundary}").into_bytes();
    let mut saved = 0usize;
    let mut pos = match find_bytes(&body, &delimiter, 0) {
        Some(p) => p,
        None => return error_response(400, "no multipart boundary found in body", Some(host)),
    };

    loop {
        let part_start = pos + delimiter.len();
        // "--" after the delimiter closes the multipart body.
        if body[part_start..].starts_with(b"--") {
            break;
        }
        let part_end = match find_bytes(&body, &delimiter, part_start) {
            Some(p) => p,
            None => break,
        };

        let part = &body[part_start..part_end];
        match save_part(part, upload_dir) {
            Ok(true) => saved += 1,
            Ok(false) => {}
            Err(response) => return *response,
        }
        pos = part_end;
    }

    tracing::debug!(files = saved, "upload complete");
    success_response(201, "Upload OK")
}

/// Write one part's content to the upload dir if it carries a filename.
/// Returns Ok(true) when a file was written, Ok(false) for non-file parts.
fn save_part(part: &[u8], upload_dir: &Path) -> Result<bool, Box<Response>> {
    let part = part.strip_prefix(b"\r\n").unwrap_or(part);

    let header_end = match find_bytes(part, b"\r\n\r\n", 0) {
        Some(p) => p,
        None => return Ok(false),
    };
    let headers = String::from_utf8_lossy(&part[..header_end]);
    let mut content = &part[header_end + 4..];
    if content.ends_with(b"\r\n") {
        content = &content[..content.len() - 2];
    }

    let disposition = headers
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"));
    let filename = disposition.and_then(extract_filename);

    let filename = match filename {
        Some(name) => name,
        None => return Ok(false),
    };

    // Keep only the final component; a traversal attempt becomes a bare name.
    let safe_name = match Path::new(&filename).file_name() {
        Some(name) if !name.is_empty() => name.to_os_string(),
        _ => {
            return Err(Box::new(error_response(400, "invalid filename", None)));
        }
    };

    let out_path = upload_dir.join(safe_name);
    if let Err(e) = std::fs::write(&out_path, content) {
        return Err(Box::new(error_response(500, &e.to_string(), None)));
    }
    Ok(true)
}

fn extract_boundary(content_type: &str) -> Option<String> {
    for part in content_type.split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("boundary=") {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            return Some(value.to_string());
        }
    }
    None
}

fn extract_filename(disposition: &str) -> Option<String> {
    let start = disposition.find("filename=\"")? + "filename=\"".len();
    let rest = &disposition[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn find_bytes(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    haystack
        .get(start..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + start)
}
