// ============================================
// HEARTSPHERE - Retry Logic with Exponential Backoff
// ============================================

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use super::error::GenerationError;

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(2000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Short waits, for interactive use
    pub fn quick() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }

    /// Long waits, for image jobs that hit quota often
    pub fn patient() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay_ms.min(self.max_delay.as_millis() as f64).max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}

/// Errors that know whether another attempt can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for GenerationError {
    fn is_retryable(&self) -> bool {
        GenerationError::is_retryable(self)
    }
}

/// Execute an async operation, retrying transient failures with backoff.
///
/// A non-retryable error is returned immediately. When retries run out the
/// last error is returned unchanged.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => {
                tracing::debug!("Permanent error, not retrying: {}", e);
                return Err(e);
            }
            Err(e) if retry >= policy.max_retries => {
                tracing::error!("Giving up after {} retries: {}", retry, e);
                return Err(e);
            }
            Err(e) => {
                retry += 1;
                let delay = policy.delay_for_retry(retry);
                tracing::warn!(
                    "Attempt {} failed: {}. Retrying in {:?} (retry {}/{})",
                    retry,
                    e,
                    delay,
                    retry,
                    policy.max_retries
                );
                sleep(delay).await;
            }
        }
    }
}
