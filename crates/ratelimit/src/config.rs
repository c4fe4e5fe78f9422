//! Configuration for the fixed-window limiter.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of requests admitted per window.
pub const DEFAULT_REQUESTS_PER_WINDOW: u64 = 20;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// Shortest window the limiter accepts.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// Rejected limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RateLimitConfigError {
    /// `requests_per_window` was zero.
    #[error("requests_per_window must be at least 1")]
    ZeroLimit,

    /// `window` was shorter than one millisecond.
    #[error("window must be at least 1ms, got {}µs", .0.as_micros())]
    WindowTooShort(Duration),
}

/// Limits applied by [`FixedWindowLimiter`](crate::FixedWindowLimiter).
///
/// Each key may make `requests_per_window` requests per `window`. When
/// `enabled` is `false` every request is admitted.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gatehouse_ratelimit::RateLimitConfig;
///
/// let config = RateLimitConfig::builder()
///     .requests_per_window(3)
///     .window(Duration::from_secs(5))
///     .build()?;
/// assert_eq!(config.requests_per_window(), 3);
/// # Ok::<(), gatehouse_ratelimit::RateLimitConfigError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Requests admitted per key per window.
    #[serde(default = "default_requests_per_window")]
    requests_per_window: u64,

    /// Window length.
    #[serde(with = "humantime_serde", default = "default_window")]
    window: Duration,

    /// Whether limiting is applied at all.
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_requests_per_window() -> u64 {
    DEFAULT_REQUESTS_PER_WINDOW
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

fn default_enabled() -> bool {
    true
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: DEFAULT_REQUESTS_PER_WINDOW,
            window: DEFAULT_WINDOW,
            enabled: true,
        }
    }
}

#[bon::bon]
impl RateLimitConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitConfigError`] if the limit is zero or the window
    /// is shorter than one millisecond.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_REQUESTS_PER_WINDOW)] requests_per_window: u64,
        #[builder(default = DEFAULT_WINDOW)] window: Duration,
        #[builder(default = true)] enabled: bool,
    ) -> Result<Self, RateLimitConfigError> {
        let config = Self { requests_per_window, window, enabled };
        config.validate()?;
        Ok(config)
    }

    /// A configuration that admits everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, ..Self::default() }
    }

    /// Checks the invariants a deserialized configuration skipped.
    ///
    /// # Errors
    ///
    /// See [`RateLimitConfig::new`].
    pub fn validate(&self) -> Result<(), RateLimitConfigError> {
        if self.requests_per_window == 0 {
            return Err(RateLimitConfigError::ZeroLimit);
        }
        if self.window < MIN_WINDOW {
            return Err(RateLimitConfigError::WindowTooShort(self.window));
        }
        Ok(())
    }

    /// Returns the per-window request limit.
    #[must_use]
    pub fn requests_per_window(&self) -> u64 {
        self.requests_per_window
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns whether limiting is enabled.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Returns a copy with limiting switched on or off.
    #[must_use]
    pub fn with_enabled(self, enabled: bool) -> Self {
        Self { enabled, ..self }
    }

    /// Returns a copy with a different per-window limit.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitConfigError::ZeroLimit`] for a zero limit.
    pub fn with_requests_per_window(self, requests_per_window: u64) -> Result<Self, RateLimitConfigError> {
        let config = Self { requests_per_window, ..self };
        config.validate()?;
        Ok(config)
    }
}
