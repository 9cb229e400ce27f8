//! Default transport backed by libcurl (the `curl` crate).
//!
//! Runs in the current thread; the handler calls it from `spawn_blocking`.

use curl::easy::{Easy, List};
use std::str;
use std::time::Duration;

use super::{parse_header_lines, CallRequest, CallResponse, Transport, TransportError};
use crate::config::TransportConfig;

/// Blocking HTTP transport. One curl `Easy` handle per request.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    config: TransportConfig,
}

impl CurlTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

fn validate(request: &CallRequest) -> Result<(), TransportError> {
    if request.url.trim().is_empty() {
        return Err(TransportError::InvalidRequest("empty url".to_string()));
    }
    let method_ok = !request.method.is_empty()
        && request.method.bytes().all(|b| b.is_ascii_alphabetic() || b == b'-');
    if !method_ok {
        return Err(TransportError::InvalidRequest(format!(
            "invalid method {:?}",
            request.method
        )));
    }
    Ok(())
}

impl Transport for CurlTransport {
    fn send(&self, request: &CallRequest) -> Result<CallResponse, TransportError> {
        validate(request)?;

        let mut easy = Easy::new();
        easy.url(&request.url)?;
        match request.method.as_str() {
            "GET" => easy.get(true)?,
            "HEAD" => easy.nobody(true)?,
            "POST" => easy.post(true)?,
            other => easy.custom_request(other)?,
        }
        if request.method == "POST" || !request.body.is_empty() {
            // Sets Content-Length; switches libcurl to POST, so restore the verb.
            easy.post_fields_copy(&request.body)?;
            if request.method != "POST" {
                easy.custom_request(&request.method)?;
            }
        }
        easy.follow_location(self.config.follow_redirects)?;
        easy.max_redirections(self.config.max_redirections)?;
        easy.connect_timeout(Duration::from_secs(self.config.connect_timeout_secs))?;
        easy.timeout(Duration::from_secs(self.config.timeout_secs))?;
        easy.useragent(&self.config.user_agent)?;

        // Caller headers win over the configured User-Agent.
        if !request.headers.is_empty() {
            let mut list = List::new();
            for (k, v) in &request.headers {
                list.append(&format!("{}: {}", k.trim(), v.trim()))?;
            }
            easy.http_headers(list)?;
        }

        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()?;
        }

        let status = easy.response_code()?;
        tracing::trace!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = body.len(),
            "transport exchange complete"
        );
        Ok(CallResponse {
            status,
            headers: parse_header_lines(&header_lines),
            body,
        })
    }
}
