//! Test helpers for building limiters with explicit quotas.

use std::time::Duration;

use crate::{config::RateLimitConfig, limiter::FixedWindowLimiter};

/// An enabled configuration admitting `limit` requests per `window`.
///
/// # Panics
///
/// Panics if `limit` is zero or `window` is shorter than a millisecond.
#[must_use]
pub fn quota(limit: u64, window: Duration) -> RateLimitConfig {
    RateLimitConfig::builder()
        .requests_per_window(limit)
        .window(window)
        .build()
        .expect("test quota must be valid")
}

/// A limiter admitting `limit` requests per `window`.
#[must_use]
pub fn limiter(limit: u64, window: Duration) -> FixedWindowLimiter {
    FixedWindowLimiter::new(quota(limit, window))
}

/// Calls [`FixedWindowLimiter::allow`] `calls` times for `key` and returns
/// how many were permitted.
pub fn admit_many(limiter: &FixedWindowLimiter, key: &str, calls: usize) -> usize {
    (0..calls).filter(|_| limiter.allow(key).permitted).count()
}
