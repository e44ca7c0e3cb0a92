//! Sliding-window admission control per caller-minute.
//!
//! Two adjacent fixed minute buckets live in the shared state store; the
//! effective count is the current bucket plus the previous bucket weighted
//! by how much of it still overlaps the sliding 60-second window. Buckets
//! are atomic counters with a short TTL, so the limiter is O(1) per check
//! and consistent across gateway instances.
//!
//! A denied request leaves no trace: the speculative increment is undone
//! before returning, and neither the budget nor the circuit is consulted.

use gateway_core::GatewayError;
use gateway_store::{Clock, StateStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const MINUTE_MILLIS: u64 = 60_000;
/// Bucket TTL covers the current and the following minute
const BUCKET_TTL: Duration = Duration::from_secs(130);

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct LimiterConfig {
    /// Requests admitted per caller per sliding minute
    pub requests_per_minute: u32,
    /// Optional token budget per caller per sliding minute
    pub tokens_per_minute: Option<u32>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            tokens_per_minute: None,
        }
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Requests remaining in the current sliding window
    pub remaining: u32,
    /// When the current minute bucket rolls over, epoch milliseconds
    pub reset_at_millis: u64,
    /// Time until the bucket rollover
    pub retry_after: Duration,
}

/// Sliding-window rate limiter keyed by caller
pub struct SlidingWindowLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: LimiterConfig,
}

impl SlidingWindowLimiter {
    /// Create a new limiter over the shared state store
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: LimiterConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Check and record admission for one request costing `tokens` tokens.
    ///
    /// Pure admission control: a denial has no side effects and never
    /// consults the circuit breaker or the budget ledger.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn allow(
        &self,
        caller_key: &str,
        tokens: u32,
    ) -> Result<RateLimitDecision, GatewayError> {
        let now = self.clock.now_millis();
        let minute = now / MINUTE_MILLIS;
        let elapsed_fraction = (now % MINUTE_MILLIS) as f64 / MINUTE_MILLIS as f64;
        let reset_at_millis = (minute + 1) * MINUTE_MILLIS;
        let retry_after = Duration::from_millis(reset_at_millis - now);

        let request_count = self
            .windowed_increment("req", caller_key, minute, elapsed_fraction, 1)
            .await?;

        let limit = f64::from(self.config.requests_per_minute);
        if request_count > limit {
            self.rollback("req", caller_key, minute, 1).await;
            warn!(
                caller = caller_key,
                limit = self.config.requests_per_minute,
                "Rate limit exceeded"
            );
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_at_millis,
                retry_after,
            });
        }

        if let Some(token_limit) = self.config.tokens_per_minute {
            let token_count = self
                .windowed_increment("tok", caller_key, minute, elapsed_fraction, i64::from(tokens))
                .await?;
            if token_count > f64::from(token_limit) {
                self.rollback("tok", caller_key, minute, i64::from(tokens))
                    .await;
                self.rollback("req", caller_key, minute, 1).await;
                warn!(
                    caller = caller_key,
                    token_limit, "Token rate limit exceeded"
                );
                return Ok(RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_at_millis,
                    retry_after,
                });
            }
        }

        let remaining = (limit - request_count).max(0.0) as u32;
        debug!(caller = caller_key, remaining, "Rate limit check passed");
        Ok(RateLimitDecision {
            allowed: true,
            remaining,
            reset_at_millis,
            retry_after,
        })
    }

    /// Read-only view of a caller's current window, without admitting
    /// anything
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn status(&self, caller_key: &str) -> Result<RateLimitDecision, GatewayError> {
        let now = self.clock.now_millis();
        let minute = now / MINUTE_MILLIS;
        let elapsed_fraction = (now % MINUTE_MILLIS) as f64 / MINUTE_MILLIS as f64;
        let reset_at_millis = (minute + 1) * MINUTE_MILLIS;

        let previous = self
            .read_bucket(&bucket_key("req", caller_key, minute.wrapping_sub(1)))
            .await?;
        let current = self
            .read_bucket(&bucket_key("req", caller_key, minute))
            .await?;
        let count = previous as f64 * (1.0 - elapsed_fraction) + current as f64;

        let limit = f64::from(self.config.requests_per_minute);
        Ok(RateLimitDecision {
            allowed: count < limit,
            remaining: (limit - count).max(0.0) as u32,
            reset_at_millis,
            retry_after: Duration::from_millis(reset_at_millis - now),
        })
    }

    async fn read_bucket(&self, key: &str) -> Result<i64, GatewayError> {
        Ok(match self.store.get(key).await? {
            Some(raw) => raw.parse().unwrap_or(0),
            None => 0,
        })
    }

    /// Increment the current minute bucket and return the sliding-window
    /// weighted count including this request
    async fn windowed_increment(
        &self,
        kind: &str,
        caller_key: &str,
        minute: u64,
        elapsed_fraction: f64,
        delta: i64,
    ) -> Result<f64, GatewayError> {
        let previous = self
            .read_bucket(&bucket_key(kind, caller_key, minute.wrapping_sub(1)))
            .await?;

        let current = self
            .store
            .incr_by(&bucket_key(kind, caller_key, minute), delta, Some(BUCKET_TTL))
            .await?;

        Ok(previous as f64 * (1.0 - elapsed_fraction) + current as f64)
    }

    /// Undo a speculative increment after a denial; best-effort
    async fn rollback(&self, kind: &str, caller_key: &str, minute: u64, delta: i64) {
        let key = bucket_key(kind, caller_key, minute);
        if let Err(e) = self.store.incr_by(&key, -delta, Some(BUCKET_TTL)).await {
            warn!(key, error = %e, "Failed to roll back rate-limit increment");
        }
    }
}

fn bucket_key(kind: &str, caller_key: &str, minute: u64) -> String {
    format!("rl:{kind}:{caller_key}:{minute}")
}
