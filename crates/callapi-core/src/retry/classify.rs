//! Classify HTTP status codes for retry decisions.

/// Status recorded when the transport failed before any HTTP status was seen
/// (DNS, connect, malformed request). Never collides with a real HTTP code.
pub const TRANSPORT_FAILURE_STATUS: i32 = -2;

/// True for 429 and every 5xx status.
pub fn is_retryable_status(code: u32) -> bool {
    code == 429 || is_5xx(code as i32)
}

/// True if `code` is in 200..=299.
pub fn is_2xx(code: i32) -> bool {
    (200..300).contains(&code)
}

/// True if `code` is in 400..=499.
pub fn is_4xx(code: i32) -> bool {
    (400..500).contains(&code)
}

/// True if `code` is in 500..=599.
pub fn is_5xx(code: i32) -> bool {
    (500..600).contains(&code)
}
