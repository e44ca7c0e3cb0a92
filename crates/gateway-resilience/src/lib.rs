//! # Gateway Resilience
//!
//! Resilience patterns for the gateway, all backed by the shared state
//! store so admission decisions stay consistent across instances:
//! - Sliding-window rate limiting per caller-minute
//! - Circuit breaker for isolating a failing upstream
//! - Fingerprint-keyed response caching with per-service TTLs
//! - Bounded retry with exponential backoff
//! - Timeout management

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;
pub mod timeout;

// Re-export main types
pub use cache::{CachedResponse, CacheStats, ResponseCache};
pub use circuit_breaker::{
    CircuitBreaker, CircuitConfig, CircuitDecision, CircuitSnapshot, CircuitState,
};
pub use rate_limiter::{LimiterConfig, RateLimitDecision, SlidingWindowLimiter};
pub use retry::{RetryConfig, RetryPolicy};
pub use timeout::with_deadline;
