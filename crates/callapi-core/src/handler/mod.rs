//! Asynchronous, cancellable, retrying call handler.
//!
//! A [`Handler`] owns one retry sequence at a time. [`Handler::send`] flips
//! the phase to `Calling` and spawns the retry loop on the tokio runtime;
//! the caller then observes the handler through its accessors, waits for
//! normal completion with [`Handler::wait`], or aborts with
//! [`Handler::cancel`].
//!
//! # Lifecycle
//! ```text
//! Stopped → Calling → { BackingOff ⇄ Calling }* → Stopped | Cancelled
//! ```
//!
//! `wait()` resolves only on `Stopped`. A cancelled run never completes
//! `wait()`; cancellation is observed through `cancel()` returning.

mod run;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot, watch};

use crate::clock::Clock;
use crate::retry::RetryPolicy;
use crate::transport::{first_header, CallRequest, HeaderMap, Transport};

/// Where a handler is in its retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// A request is in flight.
    Calling,
    /// Waiting on the backoff timer before the next attempt.
    BackingOff,
    /// Terminal: a final response or transport error was recorded.
    Stopped,
    /// Terminal: the caller cancelled the run.
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Stopped | Phase::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Calling => "calling",
            Phase::BackingOff => "backingoff",
            Phase::Stopped => "stopped",
            Phase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of a handler's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallState {
    pub attempts_remaining: u32,
    pub phase: Phase,
}

/// Serializable copy of everything a handler has recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub status: i32,
    pub headers: HeaderMap,
    /// Response body, lossily decoded as UTF-8.
    pub body: String,
}

/// Sent by `cancel()`; the loop answers on `ack` once `Cancelled` is recorded.
struct CancelRequest {
    ack: oneshot::Sender<()>,
}

struct Inner {
    state: CallState,
    status: i32,
    headers: HeaderMap,
    body: Vec<u8>,
    /// Present only while a run is active.
    cancel_tx: Option<mpsc::Sender<CancelRequest>>,
    /// Number of runs started on this handler.
    run: u64,
}

struct Shared {
    inner: Mutex<Inner>,
    /// Id of the latest run that reached `Stopped`.
    done: watch::Sender<u64>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One retry sequence over a shared transport and clock.
///
/// Cloning yields another reference to the same handler.
#[derive(Clone)]
pub struct Handler {
    shared: Arc<Shared>,
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Handler")
            .field("state", &inner.state)
            .field("status", &inner.status)
            .field("run", &inner.run)
            .finish()
    }
}

impl Handler {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        let (done, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    state: CallState {
                        attempts_remaining: 0,
                        phase: Phase::Stopped,
                    },
                    status: 0,
                    headers: HeaderMap::new(),
                    body: Vec::new(),
                    cancel_tx: None,
                    run: 0,
                }),
                done,
                transport,
                clock,
                policy,
            }),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.shared.policy
    }

    /// Start a `POST` to `url`. See [`send`](Handler::send).
    ///
    /// # Panics
    ///
    /// Panics if the handler is not `Stopped`, or outside a tokio runtime.
    pub fn post(&self, url: &str, headers: HashMap<String, String>, body: Vec<u8>) {
        self.send("POST", url, headers, body);
    }

    /// Start a retry sequence and return immediately.
    ///
    /// # Panics
    ///
    /// Starting a handler that is not `Stopped` is a usage error and panics,
    /// as does calling this outside a tokio runtime.
    pub fn send(&self, method: &str, url: &str, headers: HashMap<String, String>, body: Vec<u8>) {
        let request = CallRequest::new(method, url, headers, body);
        let (cancel_tx, cancel_rx) = mpsc::channel(1);
        let run = {
            let mut inner = self.shared.lock();
            let phase = inner.state.phase;
            if phase != Phase::Stopped {
                drop(inner);
                panic!("handler is in the middle of a call (not stopped), got {}", phase);
            }
            inner.run += 1;
            inner.state = CallState {
                attempts_remaining: self.shared.policy.max_attempts.max(1),
                phase: Phase::Calling,
            };
            inner.status = 0;
            inner.headers.clear();
            inner.body.clear();
            inner.cancel_tx = Some(cancel_tx);
            inner.run
        };
        tracing::debug!(method = %request.method, url = %request.url, run, "starting call");
        tokio::spawn(run::run_call(Arc::clone(&self.shared), run, request, cancel_rx));
    }

    /// Cancel the active run and wait until the retry loop acknowledges it.
    ///
    /// Returns immediately when no run is active. If the run finishes on its
    /// own while the request is in flight, returns once the loop has exited.
    pub async fn cancel(&self) {
        let tx = {
            let inner = self.shared.lock();
            if inner.state.phase.is_terminal() {
                return;
            }
            inner.cancel_tx.clone()
        };
        let Some(tx) = tx else {
            return;
        };
        let (ack, acked) = oneshot::channel();
        if tx.send(CancelRequest { ack }).await.is_err() {
            return;
        }
        let _ = acked.await;
    }

    /// Completion signal for the current run.
    ///
    /// Resolves once the run reaches `Stopped` (immediately if it already
    /// has). Never resolves for a cancelled run.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let shared = Arc::clone(&self.shared);
        let target = shared.lock().run;
        let mut rx = shared.done.subscribe();
        async move {
            let _keep_sender = shared;
            let stopped = rx.wait_for(|stopped| *stopped >= target).await.is_ok();
            if !stopped {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn last_state(&self) -> CallState {
        self.shared.lock().state
    }

    pub fn body(&self) -> Vec<u8> {
        self.shared.lock().body.clone()
    }

    /// HTTP status of the last response, or a negative sentinel
    /// ([`TRANSPORT_FAILURE_STATUS`](crate::retry::TRANSPORT_FAILURE_STATUS)).
    pub fn status_code(&self) -> i32 {
        self.shared.lock().status
    }

    /// First value of response header `name` (case-insensitive), or `""`.
    pub fn header(&self, name: &str) -> String {
        let inner = self.shared.lock();
        first_header(&inner.headers, name)
            .unwrap_or_default()
            .to_string()
    }

    pub fn headers(&self) -> HeaderMap {
        self.shared.lock().headers.clone()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        let inner = self.shared.lock();
        CallSnapshot {
            state: inner.state,
            status: inner.status,
            headers: inner.headers.clone(),
            body: String::from_utf8_lossy(&inner.body).into_owned(),
        }
    }
}
