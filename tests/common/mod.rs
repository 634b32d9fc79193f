//! Shared utilities for integration testing.
//!
//! Tests talk to the server over raw TCP with handwritten HTTP/1.1 so the
//! wire format itself is under test, not a client library's view of it.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use vhostd::{config::load_config_str, Server};

/// Start a server from a TOML configuration string and return the address
/// of its first listener. Configs should use `ports = [0]` so every test
/// binds an ephemeral port.
pub async fn start_server(config: &str) -> SocketAddr {
    let config = load_config_str(config).expect("test config must be valid");
    let server = Server::bind(config).await.expect("bind test server");
    let addr = server.local_addrs()[0];
    tokio::spawn(server.run());
    addr
}

/// Send one raw request and read the complete response.
///
/// The request should carry `Connection: close` unless the test manages
/// the stream itself.
pub async fn send(addr: SocketAddr, raw: &[u8]) -> String {
    let mut stream = connect(addr).await;
    stream.write_all(raw).await.unwrap();
    read_response(&mut stream).await
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    tokio::time::timeout(Duration::from_secs(5), TcpStream::connect(addr))
        .await
        .expect("connect timed out")
        .expect("connect failed")
}

/// Read exactly one HTTP response: headers, then a Content-Length body or
/// chunked framing through the terminal chunk.
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    // One byte per read so pipelined follow-up responses are never
    // consumed past the first response's framing boundary.
    let mut buf = [0u8; 1];

    let deadline = Duration::from_secs(10);
    loop {
        if response_complete(&data) {
            break;
        }
        let n = tokio::time::timeout(deadline, stream.read(&mut buf))
            .await
            .expect("read timed out")
            .expect("read failed");
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    String::from_utf8_lossy(&data).into_owned()
}

fn response_complete(data: &[u8]) -> bool {
    let Some(header_end) = find(data, b"\r\n\r\n") else {
        return false;
    };
    let headers = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
    let body = &data[header_end + 4..];

    if headers.contains("transfer-encoding: chunked") {
        return find(body, b"0\r\n\r\n").is_some();
    }
    if let Some(len) = headers
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        return body.len() >= len;
    }
    // No framing information; the close will end the read.
    false
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Status code from a raw response.
pub fn status_of(response: &str) -> u16 {
    response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("response has a status line")
}

/// Body of a raw response, chunked framing decoded if present.
#[allow(dead_code)]
pub fn body_of(response: &str) -> String {
    let (headers, body) = response
        .split_once("\r\n\r\n")
        .expect("response has a header separator");
    if !headers.to_ascii_lowercase().contains("transfer-encoding: chunked") {
        return body.to_string();
    }

    let mut decoded = String::new();
    let mut rest = body;
    while let Some((size_line, tail)) = rest.split_once("\r\n") {
        let size = usize::from_str_radix(size_line.trim(), 16).expect("chunk size");
        if size == 0 {
            break;
        }
        decoded.push_str(&tail[..size]);
        rest = &tail[size + 2..];
    }
    decoded
}
