//! Caller-side retry of conflicting updates.
//!
//! The coordinator never retries on its own. A caller that is happy to
//! re-apply its request on top of whatever another actor changed opts in
//! here; only [`UpdateError::Conflict`] is retried, with exponential backoff.

use crate::error::UpdateError;
use std::thread;
use std::time::Duration;

/// Retry policy for conflicts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::no_retry()
    }
}

impl RetryConfig {
    /// `retries` extra attempts after the first, starting at `base_delay`.
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: retries.saturating_add(1),
            base_delay,
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// A config that never retries.
    pub fn no_retry() -> Self {
        Self::new(0, Duration::from_millis(500))
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Callback trait for retry notifications.
pub trait RetryCallback {
    /// Called before sleeping ahead of attempt `attempt + 1`.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &UpdateError, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &UpdateError, _delay: Duration) {}
}

/// Callback that logs each retry as a warning.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &UpdateError, delay: Duration) {
        log::warn!(
            "attempt {attempt}/{max_attempts} failed: {error}; retrying in {}ms",
            delay.as_millis()
        );
    }
}

/// Run `operation`, retrying it while it fails with a conflict.
///
/// Any other error is returned immediately. After the last attempt the last
/// conflict is returned.
pub fn with_conflict_retry<T, F>(
    config: &RetryConfig,
    callback: &dyn RetryCallback,
    mut operation: F,
) -> Result<T, UpdateError>
where
    F: FnMut() -> Result<T, UpdateError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() || attempt + 1 >= max_attempts => return Err(e),
            Err(e) => {
                let delay = config.delay_for_attempt(attempt);
                callback.on_retry(attempt + 1, max_attempts, &e, delay);
                thread::sleep(delay);
                attempt += 1;
            }
        }
    }
}
