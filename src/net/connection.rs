//! Per-connection request/response loop.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Drive the incremental parser with whatever the socket produces
//! - Apply the phase-specific timeouts (idle, header, body)
//! - Write responses chunk by chunk and decide keep-alive
//!
//! # Design Decisions
//! - One tokio task per connection; the CGI gateway is awaited inline so
//!   a response is always handed back on the same task
//! - Bytes past the end of a request carry over into the next parser
//! - An expired keep-alive closes silently; a timeout mid-request is a 408

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::cgi;
use crate::config::{LimitsConfig, TimeoutConfig, VirtualHost};
use crate::http::response::{error_response, Response};
use crate::http::RequestParser;
use crate::routing::{self, Dispatch};
use crate::session::SessionManager;

/// Read buffer size per connection.
const READ_BUF_SIZE: usize = 16 * 1024;

/// Largest body payload pulled from a response per write.
const WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// Relaxed ordering is enough: IDs only need uniqueness.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Runtime state shared by every connection.
pub struct Shared {
    pub limits: LimitsConfig,
    pub timeouts: TimeoutConfig,
    pub sessions: SessionManager,
}

/// Which timeout governs the next read.
enum Phase {
    Idle,
    Header,
    Body,
}

/// Serve one accepted connection to completion.
pub async fn serve(
    mut stream: TcpStream,
    peer: SocketAddr,
    hosts: Arc<Vec<Arc<VirtualHost>>>,
    shared: Arc<Shared>,
) {
    let id = ConnectionId::new();
    tracing::debug!(connection = %id, peer = %peer, "connection opened");

    let mut leftover: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let mut parser = RequestParser::new(Arc::clone(&hosts), shared.limits.max_header_bytes);

        if !leftover.is_empty() {
            match parser.feed(&leftover) {
                Ok(consumed) => {
                    leftover.drain(..consumed);
                }
                Err(err) => {
                    let host = parser.host().map(Arc::as_ref);
                    let res = error_response(err.status(), &err.to_string(), host);
                    let _ = write_response(&mut stream, res, &shared.timeouts).await;
                    break;
                }
            }
        }

        while !parser.is_complete() {
            let phase = if parser.is_empty() {
                Phase::Idle
            } else if parser.host().is_none() {
                Phase::Header
            } else {
                Phase::Body
            };
            let budget = Duration::from_secs(match phase {
                Phase::Idle => shared.timeouts.idle_secs,
                Phase::Header => shared.timeouts.header_secs,
                Phase::Body => shared.timeouts.body_secs,
            });

            let read = tokio::time::timeout(budget, stream.read(&mut buf)).await;
            let n = match read {
                Ok(Ok(0)) => {
                    tracing::debug!(connection = %id, "peer closed");
                    return;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    tracing::debug!(connection = %id, error = %e, "read failed");
                    return;
                }
                Err(_) => {
                    // An idle keep-alive that expires just goes away; a
                    // timeout mid-request gets told why.
                    if !matches!(phase, Phase::Idle) {
                        let host = parser.host().map(Arc::as_ref);
                        let res = error_response(408, "request timed out", host);
                        let _ = write_response(&mut stream, res, &shared.timeouts).await;
                    }
                    tracing::debug!(connection = %id, "connection timed out");
                    return;
                }
            };

            match parser.feed(&buf[..n]) {
                Ok(consumed) => {
                    if parser.is_complete() && consumed < n {
                        leftover.extend_from_slice(&buf[consumed..n]);
                    }
                }
                Err(err) => {
                    let host = parser.host().map(Arc::as_ref);
                    let res = error_response(err.status(), &err.to_string(), host);
                    let _ = write_response(&mut stream, res, &shared.timeouts).await;
                    return;
                }
            }
        }

        let request = parser.into_request();
        let host = match &request.host {
            Some(host) => Arc::clone(host),
            None => {
                let res = error_response(500, "no virtual host bound to this port", None);
                let _ = write_response(&mut stream, res, &shared.timeouts).await;
                return;
            }
        };

        let mut response = match routing::dispatch(&request, &host) {
            Dispatch::Reply(response) => response,
            Dispatch::Cgi(route) => {
                cgi::execute(
                    &request,
                    &route,
                    &host,
                    Duration::from_secs(shared.timeouts.cgi_secs),
                )
                .await
            }
        };

        if response.status() < 400 {
            if let Some(cookie) = shared.sessions.touch(request.header("Cookie")) {
                response.set_header("Set-Cookie", cookie);
            }
        }

        let error_close = response
            .header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false);
        let keep_alive = !error_close && !request.wants_close();
        response.set_header(
            "Connection",
            if keep_alive { "keep-alive" } else { "close" },
        );

        tracing::info!(
            connection = %id,
            method = %request.method,
            path = %request.path,
            host = %host.name,
            status = response.status(),
            "request served"
        );

        // The spooled body file disappears with the request.
        drop(request);

        if write_response(&mut stream, response, &shared.timeouts)
            .await
            .is_err()
        {
            break;
        }
        if !keep_alive {
            break;
        }
    }

    tracing::debug!(connection = %id, "connection closed");
}

/// Drain a response onto the socket within the body-phase write budget.
async fn write_response(
    stream: &mut TcpStream,
    mut response: Response,
    timeouts: &TimeoutConfig,
) -> std::io::Result<()> {
    let budget = Duration::from_secs(timeouts.body_secs);
    let write = async {
        while let Some(chunk) = response.next_chunk(WRITE_CHUNK_SIZE)? {
            stream.write_all(&chunk).await?;
        }
        stream.flush().await
    };
    tokio::time::timeout(budget, write)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "response write timed out"))?
}
