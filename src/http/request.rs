//! Incremental HTTP/1.1 request parsing.
//!
//! # Responsibilities
//! - Accumulate and parse the request line and headers (bounded)
//! - Resolve the virtual host as soon as headers complete
//! - Decode fixed-length and chunked bodies, spooling to a temp file
//! - Enforce the resolved host's body size limit while reading
//!
//! # Design Decisions
//! - Synchronous `feed(&[u8])` state machine: the connection task hands it
//!   whatever the socket produced, at any byte boundary
//! - Bodies are never held in memory; the spool file is deleted on drop
//! - Any violation poisons the parser; the connection must close

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::VirtualHost;

/// Longest accepted chunk-size line, including extensions.
const MAX_CHUNK_SIZE_LINE: usize = 64;

/// Cap on the chunked trailer section.
const MAX_TRAILER_BYTES: usize = 8 * 1024;

/// Fallback body limit when no virtual host resolved.
const DEFAULT_MAX_BODY: u64 = 1024 * 1024;

/// Parse failure. Each variant maps to a deterministic response status,
/// after which the connection closes.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("header section too large")]
    HeaderTooLarge,

    #[error("malformed request line")]
    BadRequestLine,

    #[error("unsupported HTTP version")]
    BadVersion,

    #[error("invalid Content-Length")]
    BadContentLength,

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("invalid chunk size line")]
    BadChunkSize,

    #[error("chunk size line too long")]
    ChunkSizeLineTooLong,

    #[error("chunk data not terminated by CRLF")]
    BadChunkTerminator,

    #[error("chunk trailer section too large")]
    TrailersTooLarge,

    #[error("body spool error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Status code for the error response this failure produces.
    pub fn status(&self) -> u16 {
        match self {
            ParseError::PayloadTooLarge => 413,
            ParseError::Io(_) => 500,
            _ => 400,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Headers,
    FixedBody,
    ChunkSizeLine,
    ChunkData,
    ChunkDataCrlf,
    ChunkTrailers,
    Done,
}

/// A fully parsed request, ready for routing.
pub struct Request {
    pub method: String,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    /// Virtual host resolved from the Host header and the listener's port.
    pub host: Option<Arc<VirtualHost>>,
    /// Spooled body, if any. Deleting happens on drop.
    pub body: Option<NamedTempFile>,
    /// Total decoded body bytes.
    pub body_len: u64,
    pub chunked: bool,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header_ignore_case(&self.headers, name)
    }

    /// True when the client asked for the connection to close.
    pub fn wants_close(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
            || !self.version.eq_ignore_ascii_case("HTTP/1.1")
    }
}

/// Incremental parser for a single request on a connection.
pub struct RequestParser {
    state: State,
    hosts: Arc<Vec<Arc<VirtualHost>>>,
    max_header_bytes: usize,

    header_buf: Vec<u8>,
    line_buf: Vec<u8>,

    method: String,
    path: String,
    version: String,
    headers: HashMap<String, String>,
    chosen: Option<Arc<VirtualHost>>,

    chunked: bool,
    content_length: u64,
    max_body_bytes: u64,
    body_written: u64,
    remaining_chunk: u64,
    crlf_seen: bool,
    trailer_bytes: usize,

    spool: Option<NamedTempFile>,
}

impl RequestParser {
    /// A parser for one request arriving on a port shared by `hosts`.
    pub fn new(hosts: Arc<Vec<Arc<VirtualHost>>>, max_header_bytes: usize) -> Self {
        Self {
            state: State::Headers,
            hosts,
            max_header_bytes,
            header_buf: Vec::with_capacity(1024),
            line_buf: Vec::with_capacity(64),
            method: String::new(),
            path: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            chosen: None,
            chunked: false,
            content_length: 0,
            max_body_bytes: DEFAULT_MAX_BODY,
            body_written: 0,
            remaining_chunk: 0,
            crlf_seen: false,
            trailer_bytes: 0,
            spool: None,
        }
    }

    /// Feed bytes from the socket. Returns how many were consumed; bytes past
    /// the end of a completed request are left for the caller (next request).
    pub fn feed(&mut self, buf: &[u8]) -> Result<usize, ParseError> {
        let mut pos = 0;
        while pos < buf.len() && self.state != State::Done {
            match self.state {
                State::Headers => self.read_headers(buf, &mut pos)?,
                State::FixedBody => self.read_fixed_body(buf, &mut pos)?,
                State::ChunkSizeLine => self.read_chunk_size_line(buf, &mut pos)?,
                State::ChunkData => self.read_chunk_data(buf, &mut pos)?,
                State::ChunkDataCrlf => self.read_chunk_data_crlf(buf, &mut pos)?,
                State::ChunkTrailers => self.read_chunk_trailers(buf, &mut pos)?,
                State::Done => {}
            }
        }
        Ok(pos)
    }

    /// True once the request, including any body, is fully decoded.
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// True if no byte of this request has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.state == State::Headers && self.header_buf.is_empty()
    }

    /// Virtual host resolved once headers were parsed, if any.
    pub fn host(&self) -> Option<&Arc<VirtualHost>> {
        self.chosen.as_ref()
    }

    /// Convert into the routed request. Call only after [`is_complete`].
    pub fn into_request(self) -> Request {
        Request {
            method: self.method,
            path: self.path,
            version: self.version,
            headers: self.headers,
            host: self.chosen,
            body: self.spool,
            body_len: self.body_written,
            chunked: self.chunked,
        }
    }

    fn read_headers(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        while *pos < buf.len() {
            self.header_buf.push(buf[*pos]);
            *pos += 1;

            if self.header_buf.ends_with(b"\r\n\r\n") {
                self.parse_headers()?;
                self.decide_body_mode()?;
                return Ok(());
            }
            if self.header_buf.len() > self.max_header_bytes {
                return Err(ParseError::HeaderTooLarge);
            }
        }
        Ok(())
    }

    fn parse_headers(&mut self) -> Result<(), ParseError> {
        let end = self.header_buf.len() - 4;
        let text = String::from_utf8_lossy(&self.header_buf[..end]).into_owned();
        let mut lines = text.split("\r\n");

        let request_line = lines.next().ok_or(ParseError::BadRequestLine)?;
        let mut parts = request_line.split_whitespace();
        self.method = parts
            .next()
            .ok_or(ParseError::BadRequestLine)?
            .to_ascii_uppercase();
        self.path = parts
            .next()
            .ok_or(ParseError::BadRequestLine)?
            .to_string();
        self.version = parts
            .next()
            .ok_or(ParseError::BadRequestLine)?
            .to_string();
        if !self.version.starts_with("HTTP/") {
            return Err(ParseError::BadVersion);
        }

        for line in lines {
            if line.is_empty() {
                break;
            }
            // First colon splits key and value; lines without one are skipped.
            if let Some(idx) = line.find(':') {
                let key = line[..idx].trim().to_string();
                let value = line[idx + 1..].trim().to_string();
                self.headers.insert(key, value);
            }
        }
        Ok(())
    }

    fn decide_body_mode(&mut self) -> Result<(), ParseError> {
        let host_header = header_ignore_case(&self.headers, "Host");
        self.chosen = resolve_host(&self.hosts, host_header);
        self.max_body_bytes = self
            .chosen
            .as_ref()
            .map(|h| h.client_max_body_size)
            .unwrap_or(DEFAULT_MAX_BODY);

        let transfer_encoding = header_ignore_case(&self.headers, "Transfer-Encoding");
        if transfer_encoding
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            self.chunked = true;
            self.open_spool()?;
            self.state = State::ChunkSizeLine;
            return Ok(());
        }

        if let Some(cl) = header_ignore_case(&self.headers, "Content-Length") {
            self.content_length = cl
                .trim()
                .parse::<u64>()
                .map_err(|_| ParseError::BadContentLength)?;
            if self.content_length == 0 {
                self.state = State::Done;
                return Ok(());
            }
            // Refused before a single body byte is read.
            if self.content_length > self.max_body_bytes {
                return Err(ParseError::PayloadTooLarge);
            }
            self.open_spool()?;
            self.state = State::FixedBody;
            return Ok(());
        }

        self.state = State::Done;
        Ok(())
    }

    fn open_spool(&mut self) -> Result<(), ParseError> {
        if self.spool.is_none() {
            self.spool = Some(NamedTempFile::with_prefix("reqbody_")?);
        }
        Ok(())
    }

    fn read_fixed_body(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        let remaining = self.content_length - self.body_written;
        let take = remaining.min((buf.len() - *pos) as u64) as usize;
        if take > 0 {
            self.write_body(&buf[*pos..*pos + take])?;
            *pos += take;
        }
        if self.body_written >= self.content_length {
            self.finish_body()?;
        }
        Ok(())
    }

    fn read_chunk_size_line(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        while *pos < buf.len() {
            self.line_buf.push(buf[*pos]);
            *pos += 1;

            if self.line_buf.ends_with(b"\r\n") {
                let line = String::from_utf8_lossy(&self.line_buf[..self.line_buf.len() - 2])
                    .trim()
                    .to_string();
                self.line_buf.clear();

                // Chunk extensions after ';' are ignored.
                let size_part = line.split(';').next().unwrap_or("").trim();
                let size =
                    u64::from_str_radix(size_part, 16).map_err(|_| ParseError::BadChunkSize)?;

                if size == 0 {
                    self.state = State::ChunkTrailers;
                } else {
                    self.remaining_chunk = size;
                    self.state = State::ChunkData;
                }
                return Ok(());
            }
            if self.line_buf.len() > MAX_CHUNK_SIZE_LINE {
                return Err(ParseError::ChunkSizeLineTooLong);
            }
        }
        Ok(())
    }

    fn read_chunk_data(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        let take = self.remaining_chunk.min((buf.len() - *pos) as u64) as usize;
        if take > 0 {
            self.write_body(&buf[*pos..*pos + take])?;
            *pos += take;
            self.remaining_chunk -= take as u64;
        }
        if self.remaining_chunk == 0 {
            self.crlf_seen = false;
            self.state = State::ChunkDataCrlf;
        }
        Ok(())
    }

    fn read_chunk_data_crlf(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        while *pos < buf.len() {
            let b = buf[*pos];
            *pos += 1;
            if !self.crlf_seen {
                if b != b'\r' {
                    return Err(ParseError::BadChunkTerminator);
                }
                self.crlf_seen = true;
            } else {
                if b != b'\n' {
                    return Err(ParseError::BadChunkTerminator);
                }
                self.state = State::ChunkSizeLine;
                return Ok(());
            }
        }
        Ok(())
    }

    fn read_chunk_trailers(&mut self, buf: &[u8], pos: &mut usize) -> Result<(), ParseError> {
        while *pos < buf.len() {
            self.line_buf.push(buf[*pos]);
            *pos += 1;
            self.trailer_bytes += 1;

            if self.line_buf.ends_with(b"\r\n") {
                // Blank line ends the trailer section; others are discarded.
                let done = self.line_buf.len() == 2;
                self.line_buf.clear();
                if done {
                    self.finish_body()?;
                    return Ok(());
                }
            }
            if self.trailer_bytes > MAX_TRAILER_BYTES {
                return Err(ParseError::TrailersTooLarge);
            }
        }
        Ok(())
    }

    fn write_body(&mut self, data: &[u8]) -> Result<(), ParseError> {
        self.body_written += data.len() as u64;
        // Cumulative check: chunked bodies have no length up front, so the
        // limit trips the instant it is exceeded.
        if self.body_written > self.max_body_bytes {
            return Err(ParseError::PayloadTooLarge);
        }
        if let Some(spool) = self.spool.as_mut() {
            spool.write_all(data)?;
        }
        Ok(())
    }

    fn finish_body(&mut self) -> Result<(), ParseError> {
        if let Some(spool) = self.spool.as_mut() {
            spool.flush()?;
        }
        self.state = State::Done;
        Ok(())
    }
}

/// Case-insensitive lookup in a header map that preserves original casing.
pub fn header_ignore_case<'a>(
    headers: &'a HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Lowercase the Host header value and strip any trailing port.
///
/// IPv6 literals are bracketed (`[::1]:8080`), so the port is whatever
/// follows the closing bracket, never the first colon.
fn normalize_host(host_header: &str) -> String {
    let lowered = host_header.trim().to_ascii_lowercase();
    if lowered.starts_with('[') {
        return match lowered.find(']') {
            Some(end) => lowered[..=end].to_string(),
            None => lowered,
        };
    }
    match lowered.find(':') {
        Some(idx) => lowered[..idx].to_string(),
        None => lowered,
    }
}

/// Pick the virtual host for a request: exact name match, then the host
/// flagged default, then the first host bound to the port.
pub fn resolve_host(
    hosts: &[Arc<VirtualHost>],
    host_header: Option<&str>,
) -> Option<Arc<VirtualHost>> {
    if let Some(header) = host_header {
        let wanted = normalize_host(header);
        if let Some(found) = hosts.iter().find(|h| h.name.to_ascii_lowercase() == wanted) {
            return Some(Arc::clone(found));
        }
    }
    if let Some(found) = hosts.iter().find(|h| h.default_server) {
        return Some(Arc::clone(found));
    }
    hosts.first().cloned()
}
