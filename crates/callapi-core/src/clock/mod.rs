//! Clock capability for the retry loop.
//!
//! The handler never sleeps on `tokio::time` directly; it asks a [`Clock`]
//! for "wake me after D" so tests can drive backoff deterministically with
//! [`FakeClock`].

mod fake;

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

pub use fake::FakeClock;

/// Boxed sleep future returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Monotonic time source shared by many handlers.
pub trait Clock: Send + Sync + 'static {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Future that completes once `duration` has passed on this clock.
    /// Dropping it before completion cancels the wait.
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Real clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}
