//! The retry loop spawned by `Handler::send`.
//!
//! Two suspension points, each a two-way `select!` against the cancel
//! channel: the transport call (on the blocking pool) and the backoff sleep.

use std::sync::Arc;
use tokio::sync::mpsc;

use super::{CallState, CancelRequest, Phase, Shared};
use crate::retry::{is_retryable_status, TRANSPORT_FAILURE_STATUS};
use crate::transport::{CallRequest, CallResponse, HeaderMap, TransportError};

impl Shared {
    fn transition(&self, attempts_remaining: u32, phase: Phase) {
        self.lock().state = CallState {
            attempts_remaining,
            phase,
        };
    }

    fn record_response(&self, response: CallResponse) {
        let mut inner = self.lock();
        inner.status = response.status as i32;
        inner.headers = response.headers;
        inner.body = response.body;
    }

    fn record_transport_failure(&self, err: &TransportError) {
        let mut inner = self.lock();
        inner.status = TRANSPORT_FAILURE_STATUS;
        inner.headers = HeaderMap::new();
        inner.body = err.to_string().into_bytes();
    }

    /// Terminal `Stopped`: fires the completion signal for `run`.
    fn finish_stopped(&self, run: u64, attempts_remaining: u32) {
        let mut inner = self.lock();
        inner.state = CallState {
            attempts_remaining,
            phase: Phase::Stopped,
        };
        inner.cancel_tx = None;
        self.done.send_replace(run);
    }

    /// Terminal `Cancelled`: acknowledges the canceller, completion never fires.
    fn finish_cancelled(&self, attempts_remaining: u32, cancel: CancelRequest) {
        {
            let mut inner = self.lock();
            inner.state = CallState {
                attempts_remaining,
                phase: Phase::Cancelled,
            };
            inner.cancel_tx = None;
        }
        let _ = cancel.ack.send(());
    }
}

pub(super) async fn run_call(
    shared: Arc<Shared>,
    run: u64,
    request: CallRequest,
    mut cancel_rx: mpsc::Receiver<CancelRequest>,
) {
    let request = Arc::new(request);
    let policy = shared.policy;
    let mut backoff = policy.backoff(shared.clock.now());
    let mut remaining = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        shared.transition(remaining, Phase::Calling);
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt,
            remaining,
            "sending request"
        );

        let transport = Arc::clone(&shared.transport);
        let req = Arc::clone(&request);
        let call = tokio::task::spawn_blocking(move || transport.send(&req));

        // The in-flight call is detached if cancellation wins; its result is dropped.
        let result = tokio::select! {
            biased;
            Some(cancel) = cancel_rx.recv() => {
                tracing::info!(url = %request.url, attempt, "call cancelled while in flight");
                shared.finish_cancelled(remaining, cancel);
                return;
            }
            joined = call => joined.unwrap_or_else(|e| Err(TransportError::Task(e.to_string()))),
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %request.url, attempt, error = %err, "transport failure");
                shared.record_transport_failure(&err);
                shared.finish_stopped(run, remaining);
                return;
            }
        };
        let status = response.status;
        shared.record_response(response);
        if !is_retryable_status(status) {
            tracing::debug!(url = %request.url, attempt, status, "call finished");
            shared.finish_stopped(run, remaining);
            return;
        }

        // No sleep when no attempt would follow it.
        if remaining <= 1 {
            tracing::info!(url = %request.url, attempt, status, "retry budget exhausted");
            shared.finish_stopped(run, 0);
            return;
        }
        let Some(delay) = backoff.next_backoff(shared.clock.now()) else {
            tracing::info!(url = %request.url, attempt, status, "retry time limit exhausted");
            shared.finish_stopped(run, remaining);
            return;
        };

        shared.transition(remaining, Phase::BackingOff);
        tracing::info!(
            url = %request.url,
            attempt,
            status,
            delay_ms = delay.as_millis() as u64,
            "retryable status, backing off"
        );

        let sleep = shared.clock.sleep(delay);
        tokio::select! {
            biased;
            Some(cancel) = cancel_rx.recv() => {
                tracing::info!(url = %request.url, attempt, "call cancelled during backoff");
                shared.finish_cancelled(remaining, cancel);
                return;
            }
            _ = sleep => {}
        }
        remaining -= 1;
    }
}
