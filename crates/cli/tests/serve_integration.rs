//! Integration tests for the `easel serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port with its
//! own database, makes HTTP requests, and verifies the responses.

use std::io::Read;
use std::net::TcpStream;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so separate test binaries don't
/// collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 20000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// A running server; killed on drop.
struct Server {
    child: Child,
    port: u16,
    _dir: TempDir,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Helper: start `easel serve` on a fresh port and database.
fn start_server() -> Server {
    let port = next_port();
    let dir = TempDir::new().expect("temp dir");

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_easel"));
    cmd.current_dir(dir.path());
    for var in ["EASEL_ORACLE", "EASEL_DATABASE", "DATABASE_URL", "EASEL_PORT", "PORT"] {
        cmd.env_remove(var);
    }
    cmd.env("EASEL_LOG", "warn");
    cmd.arg("--database").arg(dir.path().join("scene.db"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    cmd.stdout(std::process::Stdio::null());
    cmd.stderr(std::process::Stdio::null());

    let child = cmd.spawn().expect("failed to start easel serve");
    // Wait for server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _dir: dir,
    }
}

/// Helper: send a request and return (status, body as JSON).
fn request(port: u16, method: &str, path: &str, body: Option<&Value>) -> (u16, Value) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let payload = body.map(|b| b.to_string()).unwrap_or_default();
    let request = if body.is_some() {
        format!(
            "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method, path, port, payload.len(), payload
        )
    } else {
        format!(
            "{} {} HTTP/1.1\r\nHost: localhost:{}\r\nConnection: close\r\n\r\n",
            method, path, port
        )
    };
    std::io::Write::write_all(&mut stream, request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);

    let (status, body) = parse_http_response(&response);
    let json = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(port: u16, path: &str) -> (u16, Value) {
    request(port, "GET", path, None)
}

fn post(port: u16, path: &str, body: Value) -> (u16, Value) {
    request(port, "POST", path, Some(&body))
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"").to_string();
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);

    let chunked = headers
        .to_ascii_lowercase()
        .contains("transfer-encoding: chunked");
    let body = if chunked { decode_chunked(&body) } else { body };
    (status, body)
}

/// Decode chunked transfer encoding.
fn decode_chunked(data: &str) -> String {
    let mut result = String::new();
    let mut remaining = data;

    while let Some(line_end) = remaining.find("\r\n") {
        let size = match usize::from_str_radix(remaining[..line_end].trim(), 16) {
            Ok(s) => s,
            Err(_) => break,
        };
        if size == 0 {
            break;
        }
        let chunk_start = line_end + 2;
        let chunk_end = (chunk_start + size).min(remaining.len());
        result.push_str(&remaining[chunk_start..chunk_end]);
        remaining = remaining.get(chunk_end + 2..).unwrap_or("");
    }

    result
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[test]
fn health_returns_200() {
    let server = start_server();
    let (status, body) = get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[test]
fn unknown_route_is_404() {
    let server = start_server();
    let (status, body) = get(server.port, "/nope");
    assert_eq!(status, 404);
    assert_eq!(body["error"], "not found");
}

#[test]
fn chat_without_session_is_400() {
    let server = start_server();
    let (status, body) = post(
        server.port,
        "/chat",
        serde_json::json!({ "message": "draw a circle" }),
    );
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "validation");
}

#[test]
fn chat_undo_redo_and_shapes() {
    let server = start_server();
    let port = server.port;

    let (status, outcome) = post(
        port,
        "/chat",
        serde_json::json!({ "sessionId": "s1", "message": "draw a blue square" }),
    );
    assert_eq!(status, 200);
    assert_eq!(outcome["status"], "completed");
    assert!(outcome["threadId"].is_string());

    let (_, shapes) = get(port, "/shapes?kind=square");
    assert_eq!(shapes["count"], 1);

    let (status, undone) = post(port, "/undo", serde_json::json!({ "sessionId": "s1" }));
    assert_eq!(status, 200);
    assert_eq!(undone["success"], true);
    assert_eq!(undone["affectedShapes"].as_array().unwrap().len(), 1);
    assert_eq!(get(port, "/shapes").1["count"], 0);

    let (_, redone) = post(port, "/redo", serde_json::json!({ "sessionId": "s1" }));
    assert_eq!(redone["success"], true);
    assert_eq!(get(port, "/shapes").1["count"], 1);

    let (status, history) = get(port, "/history/s1?limit=5");
    assert_eq!(status, 200);
    assert_eq!(history["entries"].as_array().unwrap().len(), 1);
}

#[test]
fn suspension_round_trip_over_http() {
    let server = start_server();
    let port = server.port;

    post(
        port,
        "/chat",
        serde_json::json!({ "sessionId": "s1", "message": "draw a circle" }),
    );
    let (_, circles) = get(port, "/shapes?kind=circle");
    let circle = &circles["shapes"][0];

    let (status, suspended) = post(
        port,
        "/chat",
        serde_json::json!({
            "sessionId": "s1",
            "threadId": "th-1",
            "message": "add a square next to the circle",
        }),
    );
    assert_eq!(status, 200);
    assert_eq!(suspended["status"], "suspended");
    assert_eq!(suspended["action"], "objects_by_kind");
    let token = suspended["resumeToken"].as_str().unwrap().to_string();

    // A second message on the suspended thread is refused.
    let (status, busy) = post(
        port,
        "/chat",
        serde_json::json!({ "sessionId": "s1", "threadId": "th-1", "message": "draw a circle" }),
    );
    assert_eq!(status, 409);
    assert_eq!(busy["kind"], "concurrency");

    let answer = serde_json::json!({
        "shapes": [{
            "id": circle["id"],
            "kind": "circle",
            "position": [0.0, 0.0, 0.0],
        }]
    });
    let (status, resumed) = post(
        port,
        "/chat/continue",
        serde_json::json!({ "threadId": "th-1", "resumeToken": token, "answer": answer }),
    );
    assert_eq!(status, 200);
    assert_eq!(resumed["status"], "completed");

    // Replaying the same continuation is a conflict, not a second square.
    let (status, _) = post(
        port,
        "/chat/continue",
        serde_json::json!({ "threadId": "th-1", "resumeToken": token, "answer": answer }),
    );
    assert_eq!(status, 409);
    assert_eq!(get(port, "/shapes?kind=square").1["count"], 1);
}

#[test]
fn stale_token_is_409() {
    let server = start_server();
    let (status, body) = post(
        server.port,
        "/chat/continue",
        serde_json::json!({ "threadId": "never", "resumeToken": "x", "answer": { "shapes": [] } }),
    );
    assert_eq!(status, 409);
    assert!(body["error"].as_str().unwrap().contains("no pending suspension"));
}
