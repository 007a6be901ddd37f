//! # Retry Policy
//!
//! Every adapter call (DNS lookup, address allocation, NITRO request) runs through a
//! [`RetryPolicy`]: each attempt is bounded by a timeout, retryable failures are retried with
//! exponential backoff, and anything else is returned immediately.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::core::config::RetryConfig;
use crate::core::error::{ProvisionerError, ProvisionerResult};

/// Bounded timeout plus limited retry with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    backoff_multiplier: f64,
    attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
            backoff_multiplier: backoff_multiplier.max(1.0),
            attempt_timeout,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff,
            config.max_backoff,
            config.backoff_multiplier,
            config.attempt_timeout,
        )
    }

    /// Single attempt, no backoff; still bounded by `attempt_timeout`
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0, attempt_timeout)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1` (attempts are counted from 1)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(millis as u64).min(self.max_backoff)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut f: F) -> ProvisionerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProvisionerResult<T>>,
    {
        let mut attempt = 1;

        loop {
            let result = match timeout(self.attempt_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(ProvisionerError::Timeout {
                    timeout_ms: self.attempt_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retryable failure, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(operation, attempt, error = %err, "Giving up");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
