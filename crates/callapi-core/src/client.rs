//! Direct call/return client built on top of [`Handler`].
//!
//! Each request runs a full retry sequence (429/5xx with backoff) and
//! returns only once the handler has stopped. Failures are reported through
//! [`Response::outcome`], never as an `Err`.

use std::collections::HashMap;
use std::time::Duration;

use crate::factory::CallFactory;
use crate::retry::{is_2xx, TRANSPORT_FAILURE_STATUS};
use crate::transport::{first_header, HeaderMap};

/// Overall retry window when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Retry window used by the verb helpers (`get`, `post`, ...).
pub const HELPER_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Stop retrying after this long, including backoff time. `None` = 5 minutes.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_headers(headers: HashMap<String, String>) -> Self {
        Self {
            headers,
            timeout: Some(HELPER_TIMEOUT),
        }
    }
}

/// How a finished request should be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 2xx response.
    Success,
    /// Delivered response outside 2xx (including 5xx after retries ran out).
    HttpFailure(i32),
    /// No HTTP response; carries the transport's error text.
    TransportFailure(String),
}

/// Final result of [`Client::request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i32,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn outcome(&self) -> Outcome {
        if self.status < 0 {
            Outcome::TransportFailure(String::from_utf8_lossy(&self.body).into_owned())
        } else if is_2xx(self.status) {
            Outcome::Success
        } else {
            Outcome::HttpFailure(self.status)
        }
    }

    pub fn is_success(&self) -> bool {
        is_2xx(self.status)
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status == TRANSPORT_FAILURE_STATUS
    }

    /// First value of header `name` (case-insensitive), or `""`.
    pub fn header(&self, name: &str) -> &str {
        first_header(&self.headers, name).unwrap_or_default()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Retrying HTTP client with a direct call/return contract.
#[derive(Debug, Clone, Default)]
pub struct Client {
    factory: CallFactory,
}

impl Client {
    pub fn new(factory: CallFactory) -> Self {
        Self { factory }
    }

    /// Send `method url` and wait for the retry sequence to stop.
    ///
    /// # Panics
    ///
    /// Panics outside a tokio runtime.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        body: Vec<u8>,
        options: &RequestOptions,
    ) -> Response {
        let mut policy = *self.factory.policy();
        policy.max_elapsed_time = Some(options.timeout.unwrap_or(DEFAULT_TIMEOUT));
        let handler = self.factory.clone().with_policy(policy).new_handler();
        handler.send(method, url, options.headers.clone(), body);
        handler.wait().await;

        let snapshot_status = handler.status_code();
        tracing::debug!(method, url, status = snapshot_status, "request finished");
        Response {
            status: snapshot_status,
            headers: handler.headers(),
            body: handler.body(),
        }
    }

    pub async fn get(&self, url: &str, headers: HashMap<String, String>) -> Response {
        self.request("GET", url, Vec::new(), &RequestOptions::with_headers(headers))
            .await
    }

    pub async fn head(&self, url: &str, headers: HashMap<String, String>) -> Response {
        self.request("HEAD", url, Vec::new(), &RequestOptions::with_headers(headers))
            .await
    }

    pub async fn post(&self, url: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Response {
        self.request("POST", url, body, &RequestOptions::with_headers(headers))
            .await
    }

    pub async fn put(&self, url: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Response {
        self.request("PUT", url, body, &RequestOptions::with_headers(headers))
            .await
    }

    pub async fn patch(&self, url: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Response {
        self.request("PATCH", url, body, &RequestOptions::with_headers(headers))
            .await
    }

    pub async fn delete(&self, url: &str, body: Vec<u8>, headers: HashMap<String, String>) -> Response {
        self.request("DELETE", url, body, &RequestOptions::with_headers(headers))
            .await
    }
}
