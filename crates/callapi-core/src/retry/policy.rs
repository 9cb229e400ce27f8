use std::time::{Duration, Instant};

use super::ExponentialBackoff;

/// Exponential backoff parameters for one handler run.
///
/// `max_attempts` counts every request, including the first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor applied to the interval after each retry.
    pub multiplier: f64,
    /// Jitter as a fraction of the interval (0.1 = ±10%).
    pub randomization_factor: f64,
    /// Upper bound on a single (unjittered) backoff interval.
    pub max_interval: Duration,
    /// Stop retrying once this much time has passed since the run started.
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            initial_interval: Duration::from_secs(1),
            multiplier: 2.0,
            randomization_factor: 0.1,
            max_interval: Duration::from_secs(60),
            max_elapsed_time: Some(Duration::from_secs(15 * 60)),
        }
    }
}

impl RetryPolicy {
    /// Fresh backoff state for a run starting at `now`.
    pub fn backoff(&self, now: Instant) -> ExponentialBackoff {
        ExponentialBackoff::new(*self, now)
    }

    /// Unjittered interval before retry number `retry` (1-based), capped at `max_interval`.
    pub fn nominal_interval(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(63) as i32;
        let secs = self.initial_interval.as_secs_f64() * self.multiplier.powi(exp);
        let max = self.max_interval.as_secs_f64();
        if !secs.is_finite() || secs >= max {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs)
    }
}
