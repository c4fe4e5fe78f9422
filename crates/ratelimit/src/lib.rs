//! # Gatehouse admission control
//!
//! A fixed-window limiter that caps how many requests each caller key (in
//! practice the caller's network address) may make per time window.
//!
//! - **Per-key atomicity**: the reset-increment-compare sequence for a key runs under that key's
//!   shard lock; distinct keys in other shards never wait on each other
//! - **Coarse by construction**: fixed windows admit up to twice the limit across a boundary
//! - **Bounded memory**: [`FixedWindowLimiter::sweep_expired`] discards idle windows

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Limiter configuration.
pub mod config;
/// The fixed-window limiter.
pub mod limiter;
/// Test helpers (quota builders).
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;

pub use config::{
    DEFAULT_REQUESTS_PER_WINDOW, DEFAULT_WINDOW, RateLimitConfig, RateLimitConfigError,
};
pub use limiter::{Admission, FixedWindowLimiter, RateLimitMetricsSnapshot};
