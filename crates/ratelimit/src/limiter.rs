//! Fixed-window admission control.
//!
//! Each key owns a counter and the instant its current window started. A
//! call first resets the window if it is at least one window old, then
//! increments the counter, then compares it with the limit. The three steps
//! run under the key's shard lock in a [`DashMap`], so two callers racing on
//! one key can never both observe a stale window, while keys in other shards
//! proceed in parallel.
//!
//! # Boundary bursts
//!
//! Windows are fixed, not sliding: `limit` requests at the very end of one
//! window followed by `limit` requests at the start of the next are all
//! admitted, so up to `2 × limit` requests can land within a short span
//! around a boundary.
//!
//! # Example
//!
//! ```
//! use gatehouse_ratelimit::{FixedWindowLimiter, RateLimitConfig};
//!
//! let config = RateLimitConfig::builder().requests_per_window(2).build()?;
//! let limiter = FixedWindowLimiter::new(config);
//!
//! assert!(limiter.allow("10.0.0.1").permitted);
//! assert!(limiter.allow("10.0.0.1").permitted);
//! let third = limiter.allow("10.0.0.1");
//! assert!(!third.permitted);
//! assert!(!third.retry_after.is_zero());
//! # Ok::<(), gatehouse_ratelimit::RateLimitConfigError>(())
//! ```

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Outcome of [`FixedWindowLimiter::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Whether the request may proceed.
    pub permitted: bool,
    /// How long until the key's window resets; zero when permitted.
    pub retry_after: Duration,
}

impl Admission {
    /// A permitted request.
    #[must_use]
    pub const fn permit() -> Self {
        Self { permitted: true, retry_after: Duration::ZERO }
    }

    /// A denied request that may retry after `retry_after`.
    #[must_use]
    pub const fn deny(retry_after: Duration) -> Self {
        Self { permitted: false, retry_after }
    }
}

/// Per-key window state.
#[derive(Debug, Clone, Copy)]
struct Window {
    count: u64,
    started: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { count: 0, started: now }
    }

    /// Resets if expired, counts the request, and decides.
    fn admit(&mut self, now: Instant, limit: u64, length: Duration) -> Admission {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= length {
            self.count = 0;
            self.started = now;
        }

        self.count = self.count.saturating_add(1);
        if self.count <= limit {
            Admission::permit()
        } else {
            let elapsed = now.saturating_duration_since(self.started);
            Admission::deny(length.saturating_sub(elapsed))
        }
    }
}

/// Metrics tracked by the limiter.
#[derive(Debug, Default)]
struct LimiterMetrics {
    allowed: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of limiter metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitMetricsSnapshot {
    /// Total requests admitted.
    pub allowed: u64,
    /// Total requests denied.
    pub rejected: u64,
    /// Keys with a live window.
    pub tracked_keys: u64,
}

/// A fixed-window rate limiter keyed by caller.
///
/// Thread-safe and cheap to share behind an `Arc`. Time comes from
/// [`tokio::time::Instant`], so a paused tokio clock drives it in tests.
pub struct FixedWindowLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Window>,
    metrics: LimiterMetrics,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .field("tracked_keys", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl FixedWindowLimiter {
    /// Creates a limiter with the given configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, windows: DashMap::new(), metrics: LimiterMetrics::default() }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts one request for `key` and decides whether it may proceed.
    ///
    /// When limiting is disabled every call is permitted with a zero
    /// retry-after and no state is kept.
    pub fn allow(&self, key: &str) -> Admission {
        if !self.config.enabled() {
            return Admission::permit();
        }

        let now = Instant::now();
        let limit = self.config.requests_per_window();
        let length = self.config.window();

        // The shard write lock is held for the whole reset-increment-compare.
        let admission = match self.windows.get_mut(key) {
            Some(mut window) => window.admit(now, limit, length),
            None => self
                .windows
                .entry(key.to_owned())
                .or_insert_with(|| Window::new(now))
                .admit(now, limit, length),
        };

        if admission.permitted {
            self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                key,
                retry_after_ms = admission.retry_after.as_millis() as u64,
                "rate limit exceeded"
            );
        }
        admission
    }

    /// Requests counted in `key`'s current window, if it has one.
    ///
    /// The value is as of the last call; an expired window is only reset by
    /// the next [`allow`](Self::allow).
    #[must_use]
    pub fn count(&self, key: &str) -> Option<u64> {
        self.windows.get(key).map(|window| window.count)
    }

    /// Drops every window at least one window old and returns how many were
    /// removed.
    ///
    /// Dropping an expired window is equivalent to resetting it, so this
    /// never changes an admission decision; it only bounds memory by the
    /// number of recently active keys.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let length = self.config.window();
        let before = self.windows.len();
        self.windows.retain(|_, window| now.saturating_duration_since(window.started) < length);
        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.windows.len(), "swept expired rate windows");
        }
        removed
    }

    /// Returns a snapshot of the limiter metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            tracked_keys: self.windows.len() as u64,
        }
    }
}
