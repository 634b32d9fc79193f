//! Incremental HTTP/1.1 response serialization.
//!
//! # Responsibilities
//! - Serialize status line + headers, computing Content-Length when absent
//! - Drain exactly one body source: flat bytes, open file, or a dynamic
//!   buffer framed as chunked transfer encoding
//! - Expose completion so the connection knows when to stop writing
//!
//! # Design Decisions
//! - Pull contract: `next_chunk(max)` returns the next wire bytes or None,
//!   so writes are driven by the caller and never block internally
//! - Error responses prefer the host's configured error page file, falling
//!   back to a generated HTML body, and always close the connection

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::VirtualHost;

/// Exactly one body source per response.
enum Body {
    /// In-memory buffer, sent whole on the first body pull.
    Bytes { data: Vec<u8>, sent: bool },
    /// Open file drained from the current offset.
    File { file: File, size: u64, sent: u64 },
    /// Append-only dynamic buffer framed as HTTP chunks.
    Chunked {
        buf: Vec<u8>,
        finished: bool,
        terminal_sent: bool,
    },
}

/// A response under construction, then drained read-only by the writer.
pub struct Response {
    status: u16,
    reason: &'static str,
    headers: Vec<(String, String)>,
    body: Body,
    headers_sent: bool,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            reason: reason_phrase(status),
            headers: Vec::new(),
            body: Body::Bytes {
                data: Vec::new(),
                sent: false,
            },
            headers_sent: false,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// Set a header, replacing any existing value (case-insensitive name).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        for (k, v) in self.headers.iter_mut() {
            if k.eq_ignore_ascii_case(name) {
                *v = value;
                return;
            }
        }
        self.headers.push((name.to_string(), value));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Use an in-memory buffer as the body.
    pub fn set_body(&mut self, data: impl Into<Vec<u8>>) {
        self.body = Body::Bytes {
            data: data.into(),
            sent: false,
        };
    }

    /// Use an open file as the body; sets Content-Length from its size.
    pub fn set_body_file(&mut self, path: &Path) -> std::io::Result<()> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        self.set_header("Content-Length", size.to_string());
        self.body = Body::File {
            file,
            size,
            sent: 0,
        };
        Ok(())
    }

    /// Switch to chunked transfer encoding with a dynamic buffer body.
    /// Any Content-Length header is dropped; the two framings are exclusive.
    pub fn enable_chunked(&mut self) {
        self.remove_header("Content-Length");
        self.set_header("Transfer-Encoding", "chunked");
        self.body = Body::Chunked {
            buf: Vec::new(),
            finished: false,
            terminal_sent: false,
        };
    }

    /// Append bytes to the dynamic buffer. No-op for other body sources.
    pub fn append_body(&mut self, data: &[u8]) {
        if let Body::Chunked { buf, .. } = &mut self.body {
            buf.extend_from_slice(data);
        }
    }

    /// Mark the dynamic buffer complete so the terminal chunk can be sent.
    pub fn finish_streaming(&mut self) {
        if let Body::Chunked { finished, .. } = &mut self.body {
            *finished = true;
        }
    }

    /// Pull the next wire bytes, at most `max_size` of body payload.
    ///
    /// The first call returns the serialized status line and headers.
    /// Returns `None` when there is nothing to send right now; check
    /// [`is_complete`](Self::is_complete) to distinguish "done" from
    /// "waiting for more streamed data".
    pub fn next_chunk(&mut self, max_size: usize) -> std::io::Result<Option<Vec<u8>>> {
        if !self.headers_sent {
            let head = self.build_headers();
            self.headers_sent = true;
            return Ok(Some(head));
        }

        match &mut self.body {
            Body::Bytes { data, sent } => {
                if *sent || data.is_empty() {
                    *sent = true;
                    return Ok(None);
                }
                *sent = true;
                Ok(Some(std::mem::take(data)))
            }
            Body::File { file, size, sent } => {
                let remaining = *size - *sent;
                if remaining == 0 {
                    return Ok(None);
                }
                let want = remaining.min(max_size as u64) as usize;
                let mut buf = vec![0u8; want];
                let n = file.read(&mut buf)?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                *sent += n as u64;
                Ok(Some(buf))
            }
            Body::Chunked {
                buf,
                finished,
                terminal_sent,
            } => {
                if !buf.is_empty() {
                    let take = buf.len().min(max_size);
                    let payload: Vec<u8> = buf.drain(..take).collect();
                    let mut framed = format!("{:x}\r\n", payload.len()).into_bytes();
                    framed.extend_from_slice(&payload);
                    framed.extend_from_slice(b"\r\n");
                    return Ok(Some(framed));
                }
                if *finished && !*terminal_sent {
                    *terminal_sent = true;
                    return Ok(Some(b"0\r\n\r\n".to_vec()));
                }
                Ok(None)
            }
        }
    }

    /// Headers sent and the body source exhausted.
    pub fn is_complete(&self) -> bool {
        if !self.headers_sent {
            return false;
        }
        match &self.body {
            Body::Bytes { data, sent } => *sent || data.is_empty(),
            Body::File { size, sent, .. } => sent >= size,
            Body::Chunked { terminal_sent, .. } => *terminal_sent,
        }
    }

    fn build_headers(&mut self) -> Vec<u8> {
        if self.header("Content-Length").is_none() && self.header("Transfer-Encoding").is_none() {
            let len = match &self.body {
                Body::Bytes { data, .. } => data.len() as u64,
                Body::File { size, .. } => *size,
                // enable_chunked always sets Transfer-Encoding.
                Body::Chunked { .. } => 0,
            };
            self.set_header("Content-Length", len.to_string());
        }

        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (k, v) in &self.headers {
            head.push_str(k);
            head.push_str(": ");
            head.push_str(v);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Standard reason phrase for a status code.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        415 => "Unsupported Media Type",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Build an error response, preferring the host's configured error page.
///
/// Error responses always close the connection.
pub fn error_response(status: u16, detail: &str, host: Option<&VirtualHost>) -> Response {
    let mut res = Response::new(status);
    res.set_header("Content-Type", "text/html; charset=UTF-8");
    res.set_header("Connection", "close");

    if let Some(page) = host.and_then(|h| h.error_page(status)) {
        if let Ok(content) = std::fs::read(page) {
            res.set_body(content);
            return res;
        }
    }

    res.set_body(format!(
        "<html><body><h1>{} {}</h1><p>{}</p></body></html>",
        status,
        reason_phrase(status),
        detail
    ));
    res
}

/// Build a redirect response with a Location header and no body work.
pub fn redirect_response(status: u16, location: &str) -> Response {
    let mut res = Response::new(status);
    res.set_header("Location", location);
    res
}

/// Build a small HTML success response.
pub fn success_response(status: u16, body: &str) -> Response {
    let mut res = Response::new(status);
    res.set_header("Content-Type", "text/html; charset=UTF-8");
    res.set_body(body.as_bytes().to_vec());
    res
}
