//! Retry and backoff policy.
//!
//! This module encapsulates status classification (retryable vs. final vs.
//! transport failure) and exponential backoff timing so the handler's retry
//! loop and the blocking client share a consistent policy.

mod backoff;
mod classify;
mod policy;

pub use backoff::ExponentialBackoff;
pub use classify::{is_2xx, is_4xx, is_5xx, is_retryable_status, TRANSPORT_FAILURE_STATUS};
pub use policy::RetryPolicy;
