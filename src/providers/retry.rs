//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`RetryConfig`] is a plain value consumed by the dispatcher; it knows
//! nothing about any particular client. Sleeping goes through the
//! [`Sleeper`] trait so tests can record backoff delays instead of waiting
//! them out.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::Result;
use crate::telemetry;

/// How the delay grows between retries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    /// `base × n` before the n-th retry.
    #[default]
    Linear,
    /// `base × multiplier^(n-1)` before the n-th retry.
    Exponential,
}

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use slipstream::{Backoff, RetryConfig};
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .base_delay(Duration::from_millis(200))
///     .backoff(Backoff::Exponential);
/// assert_eq!(config.delay_for_retry(3), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay unit. Default: 2s.
    pub base_delay: Duration,
    /// Growth curve. Default: linear.
    pub backoff: Backoff,
    /// Growth factor for [`Backoff::Exponential`]. Default: 2.0.
    pub multiplier: f64,
    /// Upper bound on any single delay. Default: 60s.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            backoff: Backoff::Linear,
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay unit.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the growth curve.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the exponential growth factor.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before the `retry`-th retry (1-indexed), capped at `max_delay`.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.base_delay.saturating_mul(retry),
            Backoff::Exponential => {
                let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
                if secs.is_finite() && secs >= 0.0 && secs < self.max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs)
                } else {
                    self.max_delay
                }
            }
        };
        delay.min(self.max_delay)
    }

    /// Delay before a retry, preferring a server `retry_after` hint.
    pub fn effective_delay(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.delay_for_retry(retry))
    }
}

// ============================================================================
// Sleeping
// ============================================================================

/// Suspends the current unit of work between retries.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

// ============================================================================
// Shared retry helper
// ============================================================================

/// Result of a retried operation plus how many attempts it took.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T>,
    /// Calls made, including the first. Always at least 1.
    pub attempts: u32,
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by
/// [`SlipstreamError::is_transient()`](crate::SlipstreamError::is_transient))
/// until `config.max_attempts` calls have been made, sleeping
/// [`RetryConfig::effective_delay`] between them. Permanent errors are
/// returned immediately. On exhaustion the last transient error is returned.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    provider: &str,
    f: F,
) -> RetryOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = config.effective_delay(attempt, e.retry_after());
                metrics::counter!(telemetry::RETRIES_TOTAL, "provider" => provider.to_owned())
                    .increment(1);
                warn!(
                    provider,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                sleeper.sleep(delay).await;
            }
            Err(e) => {
                return RetryOutcome {
                    result: Err(e),
                    attempts: attempt,
                };
            }
        }
    }
}
