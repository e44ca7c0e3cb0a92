//! Process-local state store implementation.
//!
//! Backed by a `parking_lot::RwLock<HashMap>` with lazy TTL expiry against
//! the injected clock. Suitable for tests and single-instance deployments;
//! it provides the same atomicity guarantees as a networked store because
//! every operation runs under the map's write lock.

use crate::clock::Clock;
use crate::{StateStore, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Value {
    Raw(String),
    Counter(i64),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at_millis: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at_millis
            .is_some_and(|at| now_millis >= at)
    }
}

/// In-memory [`StateStore`] implementation
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a new in-memory store reading time from the given clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn expires_at(&self, ttl: Option<Duration>) -> Option<u64> {
        ttl.map(|ttl| self.clock.now_millis() + ttl.as_millis() as u64)
    }

    /// Number of live (unexpired) keys
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries
            .read()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    /// Whether the store holds no live keys
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.clock.now_millis();
        let entries = self.entries.read();
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            return Ok(None);
        }
        let rendered = match &entry.value {
            Value::Raw(s) => s.clone(),
            Value::Counter(n) => n.to_string(),
            Value::Set { .. } => {
                return Err(StoreError::TypeMismatch {
                    key: key.to_string(),
                    expected: "raw or counter",
                })
            }
        };
        Ok(Some(rendered))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at_millis = self.expires_at(ttl);
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value: Value::Raw(value.to_string()),
                expires_at_millis,
            },
        );
        Ok(())
    }

    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        let now = self.clock.now_millis();
        let fresh_expiry = self.expires_at(ttl);
        let mut entries = self.entries.write();

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Counter(0),
            expires_at_millis: fresh_expiry,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Counter(0),
                expires_at_millis: fresh_expiry,
            };
        }

        match &mut entry.value {
            Value::Counter(n) => {
                *n = n.saturating_add(delta);
                Ok(*n)
            }
            _ => Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected: "counter",
            }),
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write();

        let current = entries.get(key).filter(|e| !e.is_expired(now));
        let matches = match (current, expected) {
            (None, None) => true,
            (Some(entry), Some(expected)) => match &entry.value {
                Value::Raw(s) => s == expected,
                Value::Counter(n) => n.to_string() == expected,
                Value::Set { .. } => false,
            },
            _ => false,
        };

        if matches {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Raw(new.to_string()),
                    expires_at_millis: self.expires_at(ttl),
                },
            );
        }
        Ok(matches)
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let now = self.clock.now_millis();
        let fresh_expiry = self.expires_at(ttl);
        let mut entries = self.entries.write();

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(HashSet::new()),
            expires_at_millis: fresh_expiry,
        });
        if entry.is_expired(now) {
            *entry = Entry {
                value: Value::Set(HashSet::new()),
                expires_at_millis: fresh_expiry,
            };
        }

        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(StoreError::TypeMismatch {
                key: key.to_string(),
                expected: "set",
            }),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}
