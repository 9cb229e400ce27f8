//! Minimal HTTP/1.1 server that answers with a scripted sequence of statuses.
//!
//! Each request gets the next status in the script (the last one repeats).
//! Responses echo the request body and report the attempt number, method and
//! User-Agent in `X-Attempt`, `X-Method` and `X-User-Agent` headers.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub struct StatusServer {
    /// Base URL, e.g. "http://127.0.0.1:12345/".
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl StatusServer {
    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. Runs until the process exits.
pub fn start(script: &[u16]) -> StatusServer {
    assert!(!script.is_empty(), "script needs at least one status");
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let script: Arc<Vec<u16>> = Arc::new(script.to_vec());
    let hits = Arc::new(AtomicUsize::new(0));
    let server_hits = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let script = Arc::clone(&script);
            let hits = Arc::clone(&server_hits);
            thread::spawn(move || handle(stream, &script, &hits));
        }
    });
    StatusServer {
        url: format!("http://127.0.0.1:{}/", port),
        hits,
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

fn handle(mut stream: TcpStream, script: &[u16], hits: &AtomicUsize) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some((head, body)) = read_request(&mut stream) else {
        return;
    };
    let (method, user_agent) = parse_head(&head);

    let attempt = hits.fetch_add(1, Ordering::SeqCst) + 1;
    let status = script[(attempt - 1).min(script.len() - 1)];
    let payload: &[u8] = if method.eq_ignore_ascii_case("HEAD") { &[] } else { &body };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nX-Attempt: {}\r\nX-Method: {}\r\nX-User-Agent: {}\r\nConnection: close\r\n\r\n",
        status,
        reason(status),
        payload.len(),
        attempt,
        method,
        user_agent
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(payload);
}

/// Reads the request head and, when `Content-Length` is set, the body.
fn read_request(stream: &mut TcpStream) -> Option<(String, Vec<u8>)> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = data[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);
    Some((head, body))
}

/// Returns (method, User-Agent or "").
fn parse_head(head: &str) -> (String, String) {
    let mut lines = head.lines();
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    let user_agent = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("user-agent"))
        .map(|(_, v)| v.trim().to_string())
        .unwrap_or_default();
    (method, user_agent)
}
