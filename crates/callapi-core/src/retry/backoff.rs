//! Stateful exponential backoff with jitter and an elapsed-time cap.

use rand::Rng;
use std::time::{Duration, Instant};

use super::RetryPolicy;

/// Backoff state for a single handler run. Not shared across handlers.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
}

impl ExponentialBackoff {
    pub fn new(policy: RetryPolicy, now: Instant) -> Self {
        Self {
            current: policy.initial_interval.min(policy.max_interval),
            policy,
            started: now,
        }
    }

    /// Time since the run started, as seen by the caller's clock.
    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    /// Next wait, or `None` once `max_elapsed_time` has been exceeded.
    pub fn next_backoff(&mut self, now: Instant) -> Option<Duration> {
        if let Some(max) = self.policy.max_elapsed_time {
            if self.elapsed(now) > max {
                return None;
            }
        }
        let interval = self.current;
        self.current = Duration::try_from_secs_f64(interval.as_secs_f64() * self.policy.multiplier)
            .map_or(self.policy.max_interval, |next| next.min(self.policy.max_interval));
        let unit: f64 = rand::thread_rng().gen();
        Some(randomize(interval, self.policy.randomization_factor, unit))
    }
}

/// Spread `interval` over `[interval * (1 - factor), interval * (1 + factor)]`
/// using `unit` in `[0, 1)`. A factor that is not finite leaves `interval` as is.
fn randomize(interval: Duration, factor: f64, unit: f64) -> Duration {
    if !factor.is_finite() {
        return interval;
    }
    let factor = factor.clamp(0.0, 1.0);
    if factor == 0.0 {
        return interval;
    }
    let base = interval.as_secs_f64();
    let low = base * (1.0 - factor);
    let high = base * (1.0 + factor);
    Duration::try_from_secs_f64(low + (high - low) * unit).unwrap_or(interval)
}
