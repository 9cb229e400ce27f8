//! Builds handlers bound to one shared transport and clock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::{Clock, TokioClock};
use crate::config::CallConfig;
use crate::handler::Handler;
use crate::retry::RetryPolicy;
use crate::transport::{CurlTransport, Transport};

/// Creates [`Handler`]s. Stateless beyond its configuration; clones share
/// the same transport and clock.
#[derive(Clone)]
pub struct CallFactory {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for CallFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallFactory")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Default for CallFactory {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl CallFactory {
    /// `None` selects the default curl transport and the tokio clock.
    pub fn new(transport: Option<Arc<dyn Transport>>, clock: Option<Arc<dyn Clock>>) -> Self {
        Self {
            transport: transport.unwrap_or_else(|| Arc::new(CurlTransport::default())),
            clock: clock.unwrap_or_else(|| Arc::new(TokioClock)),
            policy: RetryPolicy::default(),
        }
    }

    /// Curl transport and retry policy from a loaded config.
    pub fn from_config(cfg: &CallConfig) -> Self {
        Self {
            transport: Arc::new(CurlTransport::new(cfg.transport.clone())),
            clock: Arc::new(TokioClock),
            policy: cfg.retry.to_policy(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A fresh, `Stopped` handler.
    pub fn new_handler(&self) -> Handler {
        Handler::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.clock),
            self.policy,
        )
    }

    /// Start a `POST` on a new handler and return it.
    pub fn post(&self, url: &str, headers: HashMap<String, String>, body: Vec<u8>) -> Handler {
        let handler = self.new_handler();
        handler.post(url, headers, body);
        handler
    }

    /// Start `method url` on a new handler and return it.
    pub fn send(
        &self,
        method: &str,
        url: &str,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    ) -> Handler {
        let handler = self.new_handler();
        handler.send(method, url, headers, body);
        handler
    }
}
