//! Simulated clock: time moves only when the test calls `advance`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, watch};

use super::{Clock, Sleep};

struct Sleeper {
    id: u64,
    deadline: Duration,
    wake: oneshot::Sender<()>,
}

struct FakeState {
    base: Instant,
    offset: Duration,
    next_id: u64,
    sleepers: Vec<Sleeper>,
}

struct Shared {
    state: Mutex<FakeState>,
    pending: watch::Sender<usize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &FakeState) {
        self.pending.send_replace(state.sleepers.len());
    }
}

/// Deterministic clock for tests.
///
/// `now()` starts at the instant the clock was created and only moves on
/// [`advance`](FakeClock::advance). `block_until(n)` lets a test wait until
/// the code under test has parked exactly `n` sleeps.
#[derive(Clone)]
pub struct FakeClock {
    shared: Arc<Shared>,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FakeClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("FakeClock")
            .field("offset", &state.offset)
            .field("sleepers", &state.sleepers.len())
            .finish()
    }
}

impl FakeClock {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(FakeState {
                    base: Instant::now(),
                    offset: Duration::ZERO,
                    next_id: 0,
                    sleepers: Vec::new(),
                }),
                pending,
            }),
        }
    }

    /// Move time forward by `by`, waking every sleep whose deadline has passed.
    pub fn advance(&self, by: Duration) {
        let mut state = self.shared.lock();
        state.offset += by;
        let now = state.offset;
        let (due, waiting): (Vec<_>, Vec<_>) =
            state.sleepers.drain(..).partition(|s| s.deadline <= now);
        state.sleepers = waiting;
        self.shared.publish(&state);
        drop(state);
        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Number of sleeps currently parked on this clock.
    pub fn sleepers(&self) -> usize {
        self.shared.lock().sleepers.len()
    }

    /// Wait until exactly `count` sleeps are parked.
    pub async fn block_until(&self, count: usize) {
        let mut rx = self.shared.pending.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == count).await;
    }

    /// Time advanced since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.shared.lock().offset
    }
}

/// Removes a sleeper that was dropped before it fired.
struct Deregister {
    shared: Arc<Shared>,
    id: u64,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        let before = state.sleepers.len();
        state.sleepers.retain(|s| s.id != self.id);
        if state.sleepers.len() != before {
            self.shared.publish(&state);
        }
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let state = self.shared.lock();
        state.base + state.offset
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        if duration.is_zero() {
            return Box::pin(std::future::ready(()));
        }
        let (wake, fired) = oneshot::channel();
        let mut state = self.shared.lock();
        let id = state.next_id;
        state.next_id += 1;
        let deadline = state.offset + duration;
        state.sleepers.push(Sleeper { id, deadline, wake });
        self.shared.publish(&state);
        drop(state);

        let guard = Deregister {
            shared: Arc::clone(&self.shared),
            id,
        };
        Box::pin(async move {
            let _guard = guard;
            let _ = fired.await;
        })
    }
}
