use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use ward::metrics::Counters;
use ward::shutdown::{self, Shutdown, Signal};
use ward::{Context, Error, Request, Response, Router, ServeError, Server, middleware};

const PATIENCE: Duration = Duration::from_secs(5);

async fn ok(_cx: Context, _req: Request) -> Result<Response, Error> {
    Response::json(StatusCode::OK, &json!({"status": "ok"}))
}

async fn slow(_cx: Context, _req: Request) -> Result<Response, Error> {
    sleep(Duration::from_millis(300)).await;
    Response::json(StatusCode::OK, &json!({"status": "ok"}))
}

async fn stuck(_cx: Context, _req: Request) -> Result<Response, Error> {
    std::future::pending().await
}

async fn echo(_cx: Context, req: Request) -> Result<Response, Error> {
    Response::json(StatusCode::OK, &json!({"len": req.body().len()}))
}

struct Running {
    addr: SocketAddr,
    tx: Shutdown,
    handle: JoinHandle<Result<(), ServeError>>,
}

fn start(configure: impl FnOnce(Server) -> Server) -> Running {
    let socket = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = socket.local_addr().unwrap();

    let (tx, rx) = shutdown::channel();
    let app = Router::new(tx.clone(), middleware::standard(Arc::new(Counters::new())))
        .on(Method::GET, "/ok", ok).unwrap()
        .on(Method::GET, "/slow", slow).unwrap()
        .on(Method::GET, "/stuck", stuck).unwrap()
        .on(Method::POST, "/echo", echo).unwrap();

    let server = configure(Server::from_listener(socket));
    Running { addr, tx, handle: tokio::spawn(server.serve(app, rx)) }
}

async fn send(stream: &mut TcpStream, path: &str) {
    let req = format!("GET {path} HTTP/1.1\r\nhost: ward\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
}

/// Reads one response and returns its status, or `None` once the server
/// has closed the connection.
async fn status(stream: &mut TcpStream) -> Option<u16> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let len: usize = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .map_or(0, |v| v.trim().parse().unwrap());
            while buf.len() < end + 4 + len {
                let n = timeout(PATIENCE, stream.read(&mut chunk)).await.unwrap().ok()?;
                if n == 0 {
                    return None;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return head.split(' ').nth(1)?.parse().ok();
        }
        let n = timeout(PATIENCE, stream.read(&mut chunk)).await.unwrap().ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn stopped_within(handle: JoinHandle<Result<(), ServeError>>, limit: Duration) {
    let joined = timeout(limit, handle).await.expect("serve should return before the drain timeout");
    joined.unwrap().unwrap();
}

#[tokio::test]
async fn idle_keep_alive_connection_closes_on_shutdown() {
    let server = start(|s| s.drain_timeout(Duration::from_secs(10)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, "/ok").await;
    assert_eq!(status(&mut stream).await, Some(200));

    server.tx.signal(Signal::Integrity("ledger checksum mismatch".into()));

    // Closed without waiting for the drain, and nothing more is served.
    assert_eq!(status(&mut stream).await, None);
    let _ = stream.write_all(b"GET /ok HTTP/1.1\r\nhost: ward\r\n\r\n").await;
    assert_eq!(status(&mut stream).await, None);

    stopped_within(server.handle, Duration::from_secs(2)).await;
    assert!(TcpStream::connect(server.addr).await.is_err());
}

#[tokio::test]
async fn in_flight_request_finishes_during_drain() {
    let server = start(|s| s.drain_timeout(Duration::from_secs(10)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, "/slow").await;
    sleep(Duration::from_millis(50)).await;
    server.tx.signal(Signal::Terminate);

    assert_eq!(status(&mut stream).await, Some(200));
    assert_eq!(status(&mut stream).await, None);
    stopped_within(server.handle, Duration::from_secs(2)).await;
}

#[tokio::test]
async fn drain_timeout_aborts_stuck_connections() {
    let server = start(|s| s.drain_timeout(Duration::from_millis(200)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, "/stuck").await;
    sleep(Duration::from_millis(50)).await;
    server.tx.signal(Signal::Terminate);

    stopped_within(server.handle, Duration::from_secs(2)).await;
    assert_eq!(status(&mut stream).await, None);
}

#[tokio::test]
async fn idle_connection_is_closed_after_idle_timeout() {
    let server = start(|s| s.idle_timeout(Duration::from_millis(200)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, "/ok").await;
    assert_eq!(status(&mut stream).await, Some(200));
    assert_eq!(status(&mut stream).await, None);

    // Only the connection went away.
    assert!(!server.handle.is_finished());
    let mut fresh = TcpStream::connect(server.addr).await.unwrap();
    send(&mut fresh, "/ok").await;
    assert_eq!(status(&mut fresh).await, Some(200));
}

#[tokio::test]
async fn oversized_body_is_413() {
    let server = start(|s| s.max_body_bytes(16));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    let body = "x".repeat(64);
    let req = format!("POST /echo HTTP/1.1\r\nhost: ward\r\ncontent-length: 64\r\n\r\n{body}");
    stream.write_all(req.as_bytes()).await.unwrap();

    assert_eq!(status(&mut stream).await, Some(413));
}

#[tokio::test]
async fn body_within_limit_reaches_the_handler() {
    let server = start(|s| s.max_body_bytes(16));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream
        .write_all(b"POST /echo HTTP/1.1\r\nhost: ward\r\ncontent-length: 8\r\n\r\n12345678")
        .await
        .unwrap();

    assert_eq!(status(&mut stream).await, Some(200));
}

#[tokio::test]
async fn body_that_never_arrives_is_408() {
    let server = start(|s| s.read_timeout(Duration::from_millis(200)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    stream
        .write_all(b"POST /echo HTTP/1.1\r\nhost: ward\r\ncontent-length: 10\r\n\r\nab")
        .await
        .unwrap();

    assert_eq!(status(&mut stream).await, Some(408));
}

#[tokio::test]
async fn slow_handler_is_cut_off_with_503() {
    let server = start(|s| s.write_timeout(Duration::from_millis(100)));
    let mut stream = TcpStream::connect(server.addr).await.unwrap();

    send(&mut stream, "/slow").await;

    assert_eq!(status(&mut stream).await, Some(503));
}
