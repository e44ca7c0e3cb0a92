//! Fingerprint-keyed response caching.
//!
//! Content-agnostic: the caller supplies a deterministic fingerprint of
//! the semantically relevant request fields, and the cache stores the
//! serialized response under `cache:{service}:{fingerprint}` in the shared
//! state store. TTL is per service type; a service with no (or zero) TTL
//! is simply never cached. Entries are never mutated, only replaced;
//! concurrent writes for the same fingerprint are last-write-wins.

use gateway_core::GatewayError;
use gateway_store::StateStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A cached upstream response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    /// Generated content
    pub content: String,
    /// Input tokens of the original (billed) call
    pub input_tokens: u32,
    /// Output tokens of the original (billed) call
    pub output_tokens: u32,
    /// When the entry was created, epoch milliseconds
    pub created_at_millis: u64,
}

/// Cache hit/miss counters (local accelerator stats, not authoritative)
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Lookups that returned an entry
    pub hits: u64,
    /// Lookups for cacheable services that found nothing
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a fraction in [0, 1]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Response cache over the shared state store
pub struct ResponseCache {
    store: Arc<dyn StateStore>,
    ttl_by_service: HashMap<String, Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    /// Create a cache with per-service TTLs; services absent from the map
    /// are not cached
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, ttl_by_service: HashMap<String, Duration>) -> Self {
        Self {
            store,
            ttl_by_service,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Whether responses for this service type are cached at all
    #[must_use]
    pub fn is_cacheable(&self, service_type: &str) -> bool {
        self.ttl_by_service
            .get(service_type)
            .is_some_and(|ttl| !ttl.is_zero())
    }

    /// Look up a cached response
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn get(
        &self,
        service_type: &str,
        fingerprint: &str,
    ) -> Result<Option<CachedResponse>, GatewayError> {
        if !self.is_cacheable(service_type) {
            return Ok(None);
        }

        let key = cache_key(service_type, fingerprint);
        match self.store.get(&key).await? {
            Some(raw) => match serde_json::from_str::<CachedResponse>(&raw) {
                Ok(response) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    debug!(service = service_type, fingerprint, "Cache hit");
                    Ok(Some(response))
                }
                Err(_) => {
                    // Undecodable entry: drop it and treat as a miss
                    self.store.delete(&key).await?;
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    Ok(None)
                }
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(service = service_type, fingerprint, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Store a response; no-op for uncacheable services
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn put(
        &self,
        service_type: &str,
        fingerprint: &str,
        response: &CachedResponse,
    ) -> Result<(), GatewayError> {
        let Some(ttl) = self
            .ttl_by_service
            .get(service_type)
            .filter(|ttl| !ttl.is_zero())
        else {
            return Ok(());
        };

        let encoded = serde_json::to_string(response)
            .map_err(|e| GatewayError::internal(format!("cache entry encode: {e}")))?;
        self.store
            .set(&cache_key(service_type, fingerprint), &encoded, Some(*ttl))
            .await?;
        debug!(service = service_type, fingerprint, ttl_secs = ttl.as_secs(), "Response cached");
        Ok(())
    }

    /// Local hit/miss counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn cache_key(service_type: &str, fingerprint: &str) -> String {
    format!("cache:{service_type}:{fingerprint}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::{Clock, ManualClock, MemoryStore};

    fn cache(ttls: &[(&str, u64)]) -> (Arc<ManualClock>, ResponseCache) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let map = ttls
            .iter()
            .map(|(s, secs)| (s.to_string(), Duration::from_secs(*secs)))
            .collect();
        (clock.clone(), ResponseCache::new(store, map))
    }

    fn response(clock: &ManualClock) -> CachedResponse {
        CachedResponse {
            content: "cached answer".into(),
            input_tokens: 120,
            output_tokens: 340,
            created_at_millis: clock.now_millis(),
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit_then_expiry() {
        let (clock, cache) = cache(&[("explanation", 3_600)]);

        assert!(cache.get("explanation", "fp").await.unwrap().is_none());

        cache
            .put("explanation", "fp", &response(&clock))
            .await
            .unwrap();
        let hit = cache.get("explanation", "fp").await.unwrap().unwrap();
        assert_eq!(hit.content, "cached answer");

        clock.advance(Duration::from_secs(3_601));
        assert!(cache.get("explanation", "fp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncacheable_service_never_stores() {
        let (clock, cache) = cache(&[("explanation", 3_600), ("qa", 0)]);

        cache.put("qa", "fp", &response(&clock)).await.unwrap();
        assert!(cache.get("qa", "fp").await.unwrap().is_none());
        assert!(!cache.is_cacheable("qa"));
        assert!(!cache.is_cacheable("unknown"));
        assert!(cache.is_cacheable("explanation"));
    }

    #[tokio::test]
    async fn test_fingerprints_are_isolated() {
        let (clock, cache) = cache(&[("explanation", 3_600)]);

        cache
            .put("explanation", "fp-a", &response(&clock))
            .await
            .unwrap();
        assert!(cache.get("explanation", "fp-b").await.unwrap().is_none());
        assert!(cache.get("explanation", "fp-a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (clock, cache) = cache(&[("explanation", 3_600)]);

        cache
            .put("explanation", "fp", &response(&clock))
            .await
            .unwrap();
        let mut newer = response(&clock);
        newer.content = "newer answer".into();
        cache.put("explanation", "fp", &newer).await.unwrap();

        let hit = cache.get("explanation", "fp").await.unwrap().unwrap();
        assert_eq!(hit.content, "newer answer");
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let (clock, cache) = cache(&[("explanation", 3_600)]);

        cache.get("explanation", "fp").await.unwrap();
        cache
            .put("explanation", "fp", &response(&clock))
            .await
            .unwrap();
        cache.get("explanation", "fp").await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }
}
