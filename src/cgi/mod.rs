//! CGI gateway.
//!
//! # Responsibilities
//! - Resolve the request path to a script under the route's root
//! - Run the configured interpreter with the CGI environment set
//! - Feed the spooled request body on stdin, collect stdout
//! - Turn the script output into an HTTP response
//!
//! # Design Decisions
//! - The gateway is an async fn the connection task awaits; the child
//!   process is killed when the configured deadline passes and the
//!   client gets a 504, never a partial body
//! - Script output is buffered fully, then delivered with chunked
//!   transfer framing so its length never needs to be known up front
//! - Output without a header block is served verbatim as text/plain

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::{Route, VirtualHost};
use crate::http::response::{error_response, Response};
use crate::http::Request;
use crate::routing::matcher;
use crate::security::{resolve_within_root, PathError};

/// Run the CGI script selected by the request and hand back its response.
pub async fn execute(
    request: &Request,
    route: &Route,
    host: &VirtualHost,
    deadline: Duration,
) -> Response {
    let cgi = match &route.cgi {
        Some(cgi) => cgi,
        None => return error_response(500, "route has no CGI configuration", Some(host)),
    };
    let root = match &route.root {
        Some(root) => Path::new(root),
        None => return error_response(500, "no root directory defined", Some(host)),
    };

    let clean_path = matcher::strip_query(&request.path);
    if !cgi.extension.is_empty() && !clean_path.ends_with(&cgi.extension) {
        return error_response(404, "script not found", Some(host));
    }
    let script = match resolve_script(root, clean_path) {
        Ok(script) => script,
        Err(_) => return error_response(404, "script not found", Some(host)),
    };

    let mut command = Command::new(&cgi.interpreter);
    command
        .arg(&script)
        .current_dir(root)
        .env("REQUEST_METHOD", &request.method)
        .env("SCRIPT_NAME", clean_path)
        .env("PATH_INFO", "")
        .env("SERVER_PROTOCOL", &request.version)
        .env("CONTENT_LENGTH", request.body_len.to_string())
        .stdin(if request.body.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(query) = matcher::query_string(&request.path) {
        command.env("QUERY_STRING", query);
    }
    if let Some(content_type) = request.header("Content-Type") {
        command.env("CONTENT_TYPE", content_type);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(
                interpreter = %cgi.interpreter,
                script = %script.display(),
                error = %e,
                "failed to spawn CGI process"
            );
            return error_response(500, "failed to start CGI process", Some(host));
        }
    };

    let spool_path = request.body.as_ref().map(|spool| spool.path().to_path_buf());
    let output = tokio::time::timeout(deadline, drive_child(&mut child, spool_path)).await;

    match output {
        Ok(Ok((stdout, stderr))) => {
            if !stderr.is_empty() {
                tracing::debug!(
                    script = %script.display(),
                    stderr = %String::from_utf8_lossy(&stderr),
                    "CGI stderr"
                );
            }
            build_response(&stdout)
        }
        Ok(Err(e)) => {
            tracing::error!(script = %script.display(), error = %e, "CGI I/O failed");
            error_response(500, "CGI execution failed", Some(host))
        }
        Err(_) => {
            // Deadline passed; make sure the child is gone before replying.
            let _ = child.kill().await;
            tracing::warn!(script = %script.display(), "CGI deadline exceeded");
            error_response(504, "CGI script timed out", Some(host))
        }
    }
}

/// Map the query-stripped request path onto an existing script file.
fn resolve_script(root: &Path, clean_path: &str) -> Result<PathBuf, PathError> {
    let script = resolve_within_root(root, clean_path)?;
    if !script.is_file() {
        return Err(PathError::Traversal);
    }
    Ok(script)
}

/// Feed the spooled body to stdin while draining both output pipes.
async fn drive_child(
    child: &mut tokio::process::Child,
    spool_path: Option<PathBuf>,
) -> std::io::Result<(Vec<u8>, Vec<u8>)> {
    let mut stdin = child.stdin.take();
    let mut stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => return Err(std::io::Error::other("child stdout not captured")),
    };
    let mut stderr = match child.stderr.take() {
        Some(stderr) => stderr,
        None => return Err(std::io::Error::other("child stderr not captured")),
    };

    let feed = async {
        if let (Some(mut stdin), Some(path)) = (stdin.take(), spool_path) {
            if let Ok(mut spool) = tokio::fs::File::open(path).await {
                // A broken pipe here just means the script ignored its stdin.
                let _ = tokio::io::copy(&mut spool, &mut stdin).await;
            }
            // Dropping stdin closes the pipe so the script sees EOF.
        }
    };
    let drain_out = async {
        let mut out = Vec::new();
        stdout.read_to_end(&mut out).await?;
        Ok::<_, std::io::Error>(out)
    };
    let drain_err = async {
        let mut err = Vec::new();
        stderr.read_to_end(&mut err).await?;
        Ok::<_, std::io::Error>(err)
    };

    let (_, out, err) = tokio::join!(feed, drain_out, drain_err);
    let out = out?;
    let err = err?;
    child.wait().await?;
    Ok((out, err))
}

/// Parse script output into a response. A header block separated by a
/// blank line is honored; otherwise the whole output becomes the body.
fn build_response(output: &[u8]) -> Response {
    let (header_block, body) = match find_blank_line(output) {
        Some(split) => (Some(&output[..split]), &output[split + 4..]),
        None => (None, output),
    };

    let mut status = 200u16;
    let mut headers: Vec<(String, String)> = Vec::new();
    if let Some(block) = header_block {
        for line in String::from_utf8_lossy(block).lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                // Chunked framing supplies its own length.
                "content-length" | "transfer-encoding" => {}
                "status" => {
                    if let Some(code) = value
                        .split_whitespace()
                        .next()
                        .and_then(|c| c.parse::<u16>().ok())
                    {
                        status = code;
                    }
                }
                _ => headers.push((name.to_string(), value.to_string())),
            }
        }
    }

    let mut res = Response::new(status);
    let mut saw_content_type = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-type") {
            saw_content_type = true;
        }
        res.set_header(&name, &value);
    }
    if !saw_content_type {
        res.set_header("Content-Type", "text/plain; charset=UTF-8");
    }

    res.enable_chunked();
    res.append_body(body);
    res.finish_streaming();
    res
}

fn find_blank_line(output: &[u8]) -> Option<usize> {
    output.windows(4).position(|w| w == b"\r\n\r\n")
}
