//! Transport capability: one request/response exchange, no retries.
//!
//! The handler calls [`Transport::send`] on tokio's blocking pool, so
//! implementations may block for as long as the underlying client allows.
//! A single transport is shared by every handler a factory creates.

mod libcurl;
mod parse;
mod scripted;

use std::collections::HashMap;

pub use libcurl::CurlTransport;
pub use parse::parse_header_lines;
pub use scripted::{Reply, ScriptedTransport};

/// Response header multi-map. Names are stored lowercased.
pub type HeaderMap = HashMap<String, Vec<String>>;

/// Outbound request handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CallRequest {
    pub fn new(method: &str, url: &str, headers: HashMap<String, String>, body: Vec<u8>) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers,
            body,
        }
    }
}

/// A delivered HTTP response (any status).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResponse {
    pub status: u32,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl CallResponse {
    /// First value of `name` (case-insensitive), if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        first_header(&self.headers, name)
    }
}

/// First value of `name` in `headers`, matching case-insensitively.
pub(crate) fn first_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(&name.to_ascii_lowercase())
        .and_then(|values| values.first())
        .map(String::as_str)
}

/// Failure before any HTTP status was obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// libcurl reported an error (DNS, connect, timeout, TLS, ...).
    #[error("{0}")]
    Curl(#[from] curl::Error),
    /// Socket-level failure reported outside libcurl.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The request could not be built (bad method, empty URL, ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// The blocking task running the transport panicked or was aborted.
    #[error("transport task failed: {0}")]
    Task(String),
}

/// Sends one request and returns the response or a transport error.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: &CallRequest) -> Result<CallResponse, TransportError>;
}
