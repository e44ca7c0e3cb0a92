//! Bounded retry with exponential backoff.
//!
//! Retries are a loop over a fixed attempt count, not exception-driven
//! control flow. Only errors classified retryable are attempted again;
//! an upstream-reported `Retry-After` takes precedence over the computed
//! backoff for that attempt.

use gateway_core::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Backoff ceiling
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Retry policy executor
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Backoff delay before retry number `retry` (1-based)
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let delay = self.config.base_delay.saturating_mul(1 << exp);
        delay.min(self.config.max_delay)
    }

    /// Run `operation` with up to `max_retries` retries of retryable errors.
    /// The closure receives the attempt number starting at 0.
    ///
    /// # Errors
    /// Returns the last error once attempts are exhausted, or immediately
    /// for non-retryable errors
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let mut attempt = 0;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() || attempt >= self.config.max_retries {
                        if attempt > 0 {
                            warn!(
                                attempts = attempt + 1,
                                class = error.error_class(),
                                "Retries exhausted"
                            );
                        }
                        return Err(error);
                    }

                    attempt += 1;
                    let delay = match &error {
                        GatewayError::UpstreamRateLimited {
                            retry_after: Some(after),
                        } => (*after).min(self.config.max_delay),
                        _ => self.backoff_delay(attempt),
                    };
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        class = error.error_class(),
                        "Retrying upstream call"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
