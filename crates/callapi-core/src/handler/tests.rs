use super::*;
use crate::clock::{FakeClock, TokioClock};
use crate::retry::TRANSPORT_FAILURE_STATUS;
use crate::transport::{CallResponse, Reply, ScriptedTransport, TransportError};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use tokio::time::timeout;

const URL: &str = "https://sutu.shop";

fn handler_with(transport: &Arc<ScriptedTransport>, clock: &FakeClock) -> Handler {
    handler_with_policy(transport, clock, RetryPolicy::default())
}

fn handler_with_policy(
    transport: &Arc<ScriptedTransport>,
    clock: &FakeClock,
    policy: RetryPolicy,
) -> Handler {
    let transport: Arc<dyn Transport> = transport.clone();
    Handler::new(transport, Arc::new(clock.clone()), policy)
}

async fn wait_stopped(h: &Handler) {
    timeout(Duration::from_secs(5), h.wait())
        .await
        .expect("handler should reach Stopped");
}

/// Advances the fake clock in small steps whenever the handler is asleep.
fn drive(clock: &FakeClock) -> tokio::task::JoinHandle<()> {
    let clock = clock.clone();
    tokio::spawn(async move {
        loop {
            clock.block_until(1).await;
            clock.advance(Duration::from_millis(10));
        }
    })
}

/// Blocks inside `send` until the test releases it.
struct GatedTransport {
    entered: tokio::sync::mpsc::UnboundedSender<()>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

impl Transport for GatedTransport {
    fn send(&self, _request: &CallRequest) -> Result<crate::transport::CallResponse, TransportError> {
        let _ = self.entered.send(());
        let _ = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv();
        Ok(CallResponse {
            status: 200,
            body: b"late".to_vec(),
            ..CallResponse::default()
        })
    }
}

struct PanickingTransport;

impl Transport for PanickingTransport {
    fn send(&self, _request: &CallRequest) -> Result<CallResponse, TransportError> {
        panic!("transport blew up");
    }
}

#[tokio::test]
async fn async_success() {
    let transport = Arc::new(ScriptedTransport::statuses(&[200]));
    let clock = FakeClock::new();
    let h = handler_with(&transport, &clock);
    h.post(URL, HashMap::new(), Vec::new());
    assert_eq!(h.last_state().phase, Phase::Calling);

    wait_stopped(&h).await;
    assert_eq!(h.last_state().phase, Phase::Stopped);
    assert_eq!(h.status_code(), 200);
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.requests()[0].method, "POST");
}

#[tokio::test]
async fn non_retryable_statuses_stop_after_one_attempt() {
    for code in [200, 201, 204, 301, 304, 400, 401, 404, 428, 499] {
        let transport = Arc::new(ScriptedTransport::statuses(&[code, 200]));
        let clock = FakeClock::new();
        let h = handler_with(&transport, &clock);
        h.send("GET", URL, HashMap::new(), Vec::new());
        wait_stopped(&h).await;

        assert_eq!(transport.calls(), 1, "status {} must not be retried", code);
        assert_eq!(h.status_code(), code as i32);
        assert_eq!(
            h.last_state(),
            CallState {
                attempts_remaining: 15,
                phase: Phase::Stopped
            }
        );
    }
}

#[tokio::test]
async fn retryable_statuses_back_off_then_retry() {
    for code in [429, 500, 503, 599] {
        let transport = Arc::new(ScriptedTransport::statuses(&[code, 200]));
        let clock = FakeClock::new();
        let h = handler_with(&transport, &clock);
        h.post(URL, HashMap::new(), Vec::new());

        clock.block_until(1).await;
        assert_eq!(h.last_state().phase, Phase::BackingOff);
        assert_eq!(h.last_state().attempts_remaining, 15);
        assert_eq!(h.status_code(), code as i32);
        assert_eq!(transport.calls(), 1);

        clock.advance(Duration::from_millis(1100));
        wait_stopped(&h).await;
        assert_eq!(h.status_code(), 200);
        assert_eq!(transport.calls(), 2);
    }
}

#[tokio::test]
async fn backoff_waits_stay_within_jitter_bounds() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500, 500, 200]));
    let clock = FakeClock::new();
    let h = handler_with(&transport, &clock);
    h.post(URL, HashMap::new(), Vec::new());

    // First wait: 1s ± 10%.
    clock.block_until(1).await;
    clock.advance(Duration::from_millis(899));
    assert_eq!(clock.sleepers(), 1);
    clock.advance(Duration::from_millis(201));
    assert_eq!(clock.sleepers(), 0);

    // Second wait: 2s ± 10%.
    clock.block_until(1).await;
    assert_eq!(transport.calls(), 2);
    clock.advance(Duration::from_millis(1799));
    assert_eq!(clock.sleepers(), 1);
    clock.advance(Duration::from_millis(401));
    assert_eq!(clock.sleepers(), 0);

    wait_stopped(&h).await;
    assert_eq!(h.status_code(), 200);
}

#[tokio::test]
async fn three_failures_then_success_waits_one_two_four_seconds() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500, 500, 500, 200]));
    let clock = FakeClock::new();
    let h = handler_with(&transport, &clock);
    h.post(URL, HashMap::new(), Vec::new());

    let driver = drive(&clock);
    wait_stopped(&h).await;
    driver.abort();

    let elapsed = clock.elapsed();
    // 7s nominal, ±10% jitter per wait, plus one 10ms step of slack per wait.
    assert!(
        elapsed >= Duration::from_millis(6300) && elapsed <= Duration::from_millis(7730),
        "elapsed {:?}",
        elapsed
    );
    assert_eq!(h.status_code(), 200);
    assert_eq!(
        h.last_state(),
        CallState {
            attempts_remaining: 12,
            phase: Phase::Stopped
        }
    );
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn cancel_while_backing_off_skips_remaining_wait() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500, 200]));
    let clock = FakeClock::new();
    let h = handler_with(&transport, &clock);
    h.post(URL, HashMap::new(), Vec::new());
    clock.block_until(1).await;

    timeout(Duration::from_secs(5), h.cancel())
        .await
        .expect("cancel must be acknowledged");
    assert_eq!(
        h.last_state(),
        CallState {
            attempts_remaining: 15,
            phase: Phase::Cancelled
        }
    );
    assert_eq!(clock.sleepers(), 0);

    clock.advance(Duration::from_secs(3));
    assert_eq!(h.last_state().phase, Phase::Cancelled);
    assert_eq!(transport.calls(), 1);
    assert_eq!(h.status_code(), 500);
    assert!(timeout(Duration::from_millis(50), h.wait()).await.is_err());
}

#[tokio::test]
async fn cancel_while_calling_discards_late_result() {
    let (entered_tx, mut entered_rx) = tokio::sync::mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();
    let transport: Arc<dyn Transport> = Arc::new(GatedTransport {
        entered: entered_tx,
        release: Mutex::new(release_rx),
    });
    let h = Handler::new(transport, Arc::new(FakeClock::new()), RetryPolicy::default());
    h.send("GET", URL, HashMap::new(), Vec::new());
    entered_rx.recv().await.expect("transport entered");

    timeout(Duration::from_secs(5), h.cancel())
        .await
        .expect("cancel must be acknowledged");
    assert_eq!(h.last_state().phase, Phase::Cancelled);
    assert!(timeout(Duration::from_millis(50), h.wait()).await.is_err());

    release_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.last_state().phase, Phase::Cancelled);
    assert_eq!(h.status_code(), 0);
    assert!(h.body().is_empty());
}

#[tokio::test]
async fn cancel_after_stop_returns_immediately() {
    let transport = Arc::new(ScriptedTransport::statuses(&[204]));
    let h = handler_with(&transport, &FakeClock::new());
    h.post(URL, HashMap::new(), Vec::new());
    wait_stopped(&h).await;

    timeout(Duration::from_secs(1), h.cancel())
        .await
        .expect("cancel on a stopped handler is a no-op");
    assert_eq!(h.last_state().phase, Phase::Stopped);
    // Completion stays observable after the fact.
    wait_stopped(&h).await;
}

#[tokio::test]
#[should_panic(expected = "not stopped")]
async fn starting_twice_panics() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500]));
    let h = handler_with(&transport, &FakeClock::new());
    h.post(URL, HashMap::new(), Vec::new());
    h.post(URL, HashMap::new(), Vec::new());
}

#[tokio::test]
#[should_panic(expected = "got cancelled")]
async fn starting_cancelled_handler_panics() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500]));
    let clock = FakeClock::new();
    let h = handler_with(&transport, &clock);
    h.post(URL, HashMap::new(), Vec::new());
    clock.block_until(1).await;
    h.cancel().await;
    h.post(URL, HashMap::new(), Vec::new());
}

#[tokio::test]
async fn stopped_handler_can_run_again() {
    let transport = Arc::new(ScriptedTransport::statuses(&[404, 201]));
    let h = handler_with(&transport, &FakeClock::new());
    h.post(URL, HashMap::new(), Vec::new());
    wait_stopped(&h).await;
    assert_eq!(h.status_code(), 404);

    h.send("PUT", URL, HashMap::new(), b"again".to_vec());
    wait_stopped(&h).await;
    assert_eq!(h.status_code(), 201);
    assert_eq!(transport.requests()[1].body, b"again".to_vec());
}

#[tokio::test]
async fn transport_failure_records_sentinel_without_retry() {
    let transport = Arc::new(ScriptedTransport::new([
        Reply::Refused("connection refused".to_string()),
        Reply::Status(200),
    ]));
    let h = handler_with(&transport, &FakeClock::new());
    h.post(URL, HashMap::new(), Vec::new());
    wait_stopped(&h).await;

    assert_eq!(h.status_code(), TRANSPORT_FAILURE_STATUS);
    assert_eq!(h.body(), b"connection refused".to_vec());
    assert_eq!(h.last_state().phase, Phase::Stopped);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn transport_panic_is_a_transport_failure() {
    let h = Handler::new(
        Arc::new(PanickingTransport),
        Arc::new(TokioClock),
        RetryPolicy::default(),
    );
    h.send("GET", URL, HashMap::new(), Vec::new());
    wait_stopped(&h).await;
    assert_eq!(h.status_code(), TRANSPORT_FAILURE_STATUS);
    let body = String::from_utf8(h.body()).unwrap();
    assert!(body.starts_with("transport task failed"), "{}", body);
}

#[tokio::test]
async fn headers_are_case_insensitive_and_missing_is_empty() {
    let mut headers = HeaderMap::new();
    headers.insert("content-type".to_string(), vec!["text/plain".to_string()]);
    headers.insert(
        "set-cookie".to_string(),
        vec!["a=1".to_string(), "b=2".to_string()],
    );
    let transport = Arc::new(ScriptedTransport::new([Reply::Response(CallResponse {
        status: 200,
        headers,
        body: b"hi".to_vec(),
    })]));
    let h = handler_with(&transport, &FakeClock::new());
    h.post(URL, HashMap::new(), Vec::new());
    wait_stopped(&h).await;

    assert_eq!(h.header("Content-Type"), "text/plain");
    assert_eq!(h.header("Set-Cookie"), "a=1");
    assert_eq!(h.header("X-Missing"), "");
    let snap = h.snapshot();
    assert_eq!(snap.body, "hi");
    assert_eq!(snap.headers["set-cookie"].len(), 2);

    let json: serde_json::Value = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["state"]["phase"], "stopped");
    assert_eq!(json["status"], 200);
}

#[tokio::test]
async fn exhausted_budget_forces_stopped() {
    let transport = Arc::new(ScriptedTransport::statuses(&[503]));
    let clock = FakeClock::new();
    let policy = RetryPolicy {
        max_attempts: 3,
        ..RetryPolicy::default()
    };
    let h = handler_with_policy(&transport, &clock, policy);
    h.post(URL, HashMap::new(), Vec::new());

    let driver = drive(&clock);
    wait_stopped(&h).await;
    driver.abort();

    assert_eq!(transport.calls(), 3);
    assert_eq!(h.status_code(), 503);
    assert_eq!(
        h.last_state(),
        CallState {
            attempts_remaining: 0,
            phase: Phase::Stopped
        }
    );
}

#[tokio::test]
async fn elapsed_time_cap_forces_stopped() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500]));
    let clock = FakeClock::new();
    let policy = RetryPolicy {
        randomization_factor: 0.0,
        max_elapsed_time: Some(Duration::from_secs(2)),
        ..RetryPolicy::default()
    };
    let h = handler_with_policy(&transport, &clock, policy);
    h.post(URL, HashMap::new(), Vec::new());

    // Waits of 1s then 2s; at t=3s the 2s cap has passed.
    clock.block_until(1).await;
    clock.advance(Duration::from_secs(1));
    clock.block_until(1).await;
    clock.advance(Duration::from_secs(2));
    wait_stopped(&h).await;

    assert_eq!(transport.calls(), 3);
    assert_eq!(h.last_state().phase, Phase::Stopped);
    assert_eq!(h.status_code(), 500);
}

#[tokio::test]
async fn concurrent_handlers_share_one_transport() {
    let transport = Arc::new(ScriptedTransport::statuses(&[200]));
    let clock = FakeClock::new();
    let handlers: Vec<Handler> = (0..8).map(|_| handler_with(&transport, &clock)).collect();
    for h in &handlers {
        h.send("GET", URL, HashMap::new(), Vec::new());
    }
    for h in &handlers {
        wait_stopped(h).await;
        assert_eq!(h.status_code(), 200);
    }
    assert_eq!(transport.calls(), 8);
}

#[tokio::test]
async fn non_finite_jitter_still_retries_to_completion() {
    let transport = Arc::new(ScriptedTransport::statuses(&[500, 200]));
    let clock = FakeClock::new();
    let policy = RetryPolicy {
        randomization_factor: f64::NAN,
        ..RetryPolicy::default()
    };
    let h = handler_with_policy(&transport, &clock, policy);
    h.post(URL, HashMap::new(), Vec::new());

    clock.block_until(1).await;
    assert_eq!(h.last_state().phase, Phase::BackingOff);
    clock.advance(Duration::from_secs(1));
    wait_stopped(&h).await;

    assert_eq!(h.status_code(), 200);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn zero_attempt_policy_still_makes_one_call() {
    let transport = Arc::new(ScriptedTransport::statuses(&[503]));
    let clock = FakeClock::new();
    let policy = RetryPolicy {
        max_attempts: 0,
        ..RetryPolicy::default()
    };
    let h = handler_with_policy(&transport, &clock, policy);
    h.post(URL, HashMap::new(), Vec::new());
    assert_eq!(
        h.last_state(),
        CallState {
            attempts_remaining: 1,
            phase: Phase::Calling
        }
    );

    wait_stopped(&h).await;
    assert_eq!(transport.calls(), 1);
    assert_eq!(h.status_code(), 503);
    assert_eq!(h.last_state().attempts_remaining, 0);
}
