//! # Gateway Store
//!
//! Shared state store abstraction for the resilience gateway.
//!
//! The store is the single source of truth for rate-limit windows, budget
//! counters, circuit-breaker records, and cached responses across all
//! gateway instances in a horizontally scaled deployment. No component
//! keeps authoritative state only in local memory.
//!
//! [`MemoryStore`] is the process-local implementation used for tests and
//! single-instance deployments; a networked key-value store implements the
//! same [`StateStore`] trait in production.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MemoryStore;

use async_trait::async_trait;
use gateway_core::GatewayError;
use std::time::Duration;
use thiserror::Error;

/// State store operation error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Existing value at the key has an incompatible type
    #[error("Type mismatch at key {key}: expected {expected}")]
    TypeMismatch {
        /// The key being accessed
        key: String,
        /// The expected value type
        expected: &'static str,
    },

    /// Backend failure (network, serialization, etc.)
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::store(err.to_string())
    }
}

/// Key-value store with the atomic primitives the gateway depends on.
///
/// TTL arguments apply on key creation; `None` means the key does not
/// expire. All operations must be atomic with respect to concurrent
/// callers on the same key.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Get the raw value at a key, if present and unexpired
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a raw value, replacing any existing value
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically increment a counter, creating it (with `ttl`) at zero
    /// first if absent. Returns the post-increment value.
    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError>;

    /// Atomically replace the value at `key` with `new` iff the current
    /// value equals `expected` (`None` = key absent). Returns whether the
    /// swap happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Atomically add a member to a set, creating the set (with `ttl`) if
    /// absent. Returns true iff the member was newly added.
    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// Delete a key
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
