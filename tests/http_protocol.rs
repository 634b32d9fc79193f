//! Protocol-level behavior over raw TCP: framing, keep-alive, virtual
//! host selection, limits, and error pages.

mod common;

use common::{body_of, connect, read_response, send, start_server, status_of};
use tokio::io::AsyncWriteExt;

fn single_host_config(root: &str) -> String {
    format!(
        r#"
        [limits]
        max_header_bytes = 8192

        [timeouts]
        header_secs = 2
        body_secs = 5
        idle_secs = 5
        cgi_secs = 2

        [[servers]]
        name = "test.local"
        host = "127.0.0.1"
        ports = [0]
        default_server = true
        client_max_body_size = 64

        [[servers.routes]]
        path = "/"
        root = "{root}"
        index = "index.html"
        "#
    )
}

fn short_timeout_config(root: &str) -> String {
    format!(
        r#"
        [timeouts]
        header_secs = 1
        body_secs = 5
        idle_secs = 1
        cgi_secs = 2

        [[servers]]
        name = "test.local"
        host = "127.0.0.1"
        ports = [0]
        default_server = true

        [[servers.routes]]
        path = "/"
        root = "{root}"
        "#
    )
}

#[tokio::test]
async fn serves_static_file() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("page.html"), "<h1>hello</h1>").unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    let res = send(
        addr,
        b"GET /page.html HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status_of(&res), 200);
    assert!(res.contains("Content-Type: text/html"));
    assert_eq!(body_of(&res), "<h1>hello</h1>");
}

#[tokio::test]
async fn unknown_path_is_404() {
    let site = tempfile::tempdir().unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    let res = send(
        addr,
        b"GET /missing.html HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status_of(&res), 404);
    assert!(res.contains("Connection: close"));
}

#[tokio::test]
async fn keep_alive_serves_two_requests_on_one_connection() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("a.txt"), "first").unwrap();
    std::fs::write(site.path().join("b.txt"), "second").unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    let mut stream = connect(addr).await;
    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\nHost: test.local\r\n\r\n")
        .await
        .unwrap();
    let first = read_response(&mut stream).await;
    assert_eq!(status_of(&first), 200);
    assert!(first.contains("Connection: keep-alive"));
    assert_eq!(body_of(&first), "first");

    stream
        .write_all(b"GET /b.txt HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let second = read_response(&mut stream).await;
    assert_eq!(status_of(&second), 200);
    assert_eq!(body_of(&second), "second");
}

#[tokio::test]
async fn pipelined_requests_are_both_answered() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("a.txt"), "first").unwrap();
    std::fs::write(site.path().join("b.txt"), "second").unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    // Both requests arrive in one write; the leftover bytes must carry
    // over into the second request's parser.
    let mut stream = connect(addr).await;
    stream
        .write_all(
            b"GET /a.txt HTTP/1.1\r\nHost: test.local\r\n\r\n\
              GET /b.txt HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let first = read_response(&mut stream).await;
    assert_eq!(body_of(&first), "first");
    let second = read_response(&mut stream).await;
    assert_eq!(body_of(&second), "second");
}

#[tokio::test]
async fn host_header_selects_virtual_host() {
    let alpha = tempfile::tempdir().unwrap();
    let beta = tempfile::tempdir().unwrap();
    std::fs::write(alpha.path().join("who.txt"), "alpha").unwrap();
    std::fs::write(beta.path().join("who.txt"), "beta").unwrap();

    let config = format!(
        r#"
        [[servers]]
        name = "alpha.local"
        host = "127.0.0.1"
        ports = [0]
        default_server = true
        [[servers.routes]]
        path = "/"
        root = "{alpha}"

        [[servers]]
        name = "beta.local"
        host = "127.0.0.1"
        ports = [0]
        [[servers.routes]]
        path = "/"
        root = "{beta}"
        "#,
        alpha = alpha.path().to_string_lossy(),
        beta = beta.path().to_string_lossy(),
    );
    let addr = start_server(&config).await;

    let res = send(
        addr,
        b"GET /who.txt HTTP/1.1\r\nHost: beta.local\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(body_of(&res), "beta");

    // A name bound to no host falls back to the default server.
    let res = send(
        addr,
        b"GET /who.txt HTTP/1.1\r\nHost: nobody.example\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(body_of(&res), "alpha");

    // Host header port suffix is ignored for matching.
    let res = send(
        addr,
        b"GET /who.txt HTTP/1.1\r\nHost: beta.local:9999\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(body_of(&res), "beta");
}

#[tokio::test]
async fn malformed_request_line_is_400_and_closes() {
    let site = tempfile::tempdir().unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    let res = send(addr, b"NONSENSE\r\n\r\n").await;
    assert_eq!(status_of(&res), 400);
    assert!(res.contains("Connection: close"));
}

#[tokio::test]
async fn oversized_declared_body_is_413() {
    let site = tempfile::tempdir().unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    // client_max_body_size is 64; the declared length is refused before
    // any body byte is read.
    let res = send(
        addr,
        b"POST / HTTP/1.1\r\nHost: test.local\r\nContent-Length: 5000\r\n\r\n",
    )
    .await;
    assert_eq!(status_of(&res), 413);
}

#[tokio::test]
async fn configured_error_page_is_served() {
    let site = tempfile::tempdir().unwrap();
    let page = site.path().join("my404.html");
    std::fs::write(&page, "<h1>nothing here, friend</h1>").unwrap();

    let config = format!(
        r#"
        [[servers]]
        name = "test.local"
        host = "127.0.0.1"
        ports = [0]
        default_server = true

        [servers.error_pages]
        404 = "{page}"

        [[servers.routes]]
        path = "/"
        root = "{root}"
        "#,
        page = page.to_string_lossy(),
        root = site.path().to_string_lossy(),
    );
    let addr = start_server(&config).await;

    let res = send(
        addr,
        b"GET /gone.html HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert_eq!(status_of(&res), 404);
    assert!(body_of(&res).contains("nothing here, friend"));
}

#[tokio::test]
async fn stalled_header_phase_is_408() {
    let site = tempfile::tempdir().unwrap();
    let addr = start_server(&short_timeout_config(&site.path().to_string_lossy())).await;

    // Headers never complete; the server must answer 408, not hang.
    let mut stream = connect(addr).await;
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test.local\r\n")
        .await
        .unwrap();
    let res = read_response(&mut stream).await;
    assert_eq!(status_of(&res), 408);
    assert!(res.contains("Connection: close"));
}

#[tokio::test]
async fn idle_keep_alive_expiry_closes_silently() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("a.txt"), "x").unwrap();
    let addr = start_server(&short_timeout_config(&site.path().to_string_lossy())).await;

    let mut stream = connect(addr).await;
    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\nHost: test.local\r\n\r\n")
        .await
        .unwrap();
    let first = read_response(&mut stream).await;
    assert_eq!(status_of(&first), 200);
    assert!(first.contains("Connection: keep-alive"));

    // No second request: after idle_secs the server just closes, and no
    // bytes (no 408) arrive before the EOF.
    let rest = read_response(&mut stream).await;
    assert!(rest.is_empty(), "expected silent close, got: {rest:?}");
}

#[tokio::test]
async fn session_cookie_is_issued_once() {
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("a.txt"), "x").unwrap();
    let addr = start_server(&single_host_config(&site.path().to_string_lossy())).await;

    let res = send(
        addr,
        b"GET /a.txt HTTP/1.1\r\nHost: test.local\r\nConnection: close\r\n\r\n",
    )
    .await;
    let cookie_line = res
        .lines()
        .find(|l| l.starts_with("Set-Cookie: sid="))
        .expect("first response sets a session cookie")
        .to_string();
    let cookie = cookie_line
        .trim_start_matches("Set-Cookie: ")
        .split(';')
        .next()
        .unwrap()
        .to_string();

    let raw = format!(
        "GET /a.txt HTTP/1.1\r\nHost: test.local\r\nCookie: {cookie}\r\nConnection: close\r\n\r\n"
    );
    let res = send(addr, raw.as_bytes()).await;
    assert_eq!(status_of(&res), 200);
    assert!(!res.contains("Set-Cookie:"), "known session re-used");
}
