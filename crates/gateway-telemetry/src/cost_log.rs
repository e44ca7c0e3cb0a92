//! Append-only audit trail of every gateway attempt.
//!
//! The cost log is the source of truth for spend analytics: one entry per
//! attempt, created at request completion and never mutated. Recording is
//! infallible and non-blocking relative to the response path; entries are
//! only ever removed by the retention job. Aggregate queries (date-range
//! summaries, per-service and per-caller breakdowns) read the in-memory
//! log under a short read lock.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gateway_store::Clock;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// One recorded attempt
#[derive(Debug, Clone, Serialize)]
pub struct CostLogEntry {
    /// Unique entry identifier
    pub id: Uuid,
    /// Completion time, epoch milliseconds
    pub timestamp_millis: u64,
    /// Service type of the request
    pub service_type: String,
    /// Caller identity
    pub caller_id: String,
    /// Caller's organization
    pub org_id: String,
    /// Input tokens billed (0 for cache hits and fallbacks)
    pub input_tokens: u32,
    /// Output tokens billed (0 for cache hits and fallbacks)
    pub output_tokens: u32,
    /// Cost billed in the billing currency
    pub cost: f64,
    /// End-to-end latency in milliseconds
    pub duration_ms: u64,
    /// Whether the caller received real upstream content
    pub success: bool,
    /// Whether the response came from the cache
    pub cache_hit: bool,
    /// Error classification for failed attempts
    pub error_class: Option<String>,
}

/// Aggregate over a date range
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostSummary {
    /// Total cost billed
    pub total_cost: f64,
    /// Total attempts recorded
    pub total_requests: u64,
    /// Attempts that returned real upstream content
    pub successes: u64,
    /// Attempts answered from the cache
    pub cache_hits: u64,
    /// Total input tokens billed
    pub input_tokens: u64,
    /// Total output tokens billed
    pub output_tokens: u64,
}

/// Per-service aggregate
#[derive(Debug, Clone, Serialize)]
pub struct ServiceCost {
    /// Service type
    pub service_type: String,
    /// Attempts recorded
    pub requests: u64,
    /// Cost billed
    pub cost: f64,
}

/// Per-caller aggregate
#[derive(Debug, Clone, Serialize)]
pub struct CallerSpend {
    /// Caller identity
    pub caller_id: String,
    /// Attempts recorded
    pub requests: u64,
    /// Cost billed
    pub cost: f64,
}

/// Per-day aggregate
#[derive(Debug, Clone, Serialize)]
pub struct DailyCost {
    /// Budget day in the configured timezone
    pub date: String,
    /// Attempts recorded
    pub requests: u64,
    /// Cost billed
    pub cost: f64,
}

/// Append-only cost log with read-side aggregates
pub struct CostLog {
    entries: RwLock<Vec<CostLogEntry>>,
    timezone: Tz,
}

impl CostLog {
    /// Create an empty log; `timezone` defines the day boundary for the
    /// daily breakdown
    #[must_use]
    pub fn new(timezone: Tz) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            timezone,
        }
    }

    /// Append one entry. Infallible; a full or contended log never fails
    /// the outer request.
    pub fn record(&self, entry: CostLogEntry) {
        self.entries.write().push(entry);
    }

    /// Number of entries currently retained
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the log is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Aggregate over `[from_millis, to_millis)`
    #[must_use]
    pub fn summary(&self, from_millis: u64, to_millis: u64) -> CostSummary {
        let entries = self.entries.read();
        let mut summary = CostSummary::default();
        for entry in entries
            .iter()
            .filter(|e| e.timestamp_millis >= from_millis && e.timestamp_millis < to_millis)
        {
            summary.total_cost += entry.cost;
            summary.total_requests += 1;
            summary.successes += u64::from(entry.success);
            summary.cache_hits += u64::from(entry.cache_hit);
            summary.input_tokens += u64::from(entry.input_tokens);
            summary.output_tokens += u64::from(entry.output_tokens);
        }
        summary
    }

    /// Cost and request counts grouped by service type, highest spend first
    #[must_use]
    pub fn by_service(&self) -> Vec<ServiceCost> {
        let entries = self.entries.read();
        let mut grouped: HashMap<&str, (u64, f64)> = HashMap::new();
        for entry in entries.iter() {
            let slot = grouped.entry(&entry.service_type).or_default();
            slot.0 += 1;
            slot.1 += entry.cost;
        }
        let mut result: Vec<_> = grouped
            .into_iter()
            .map(|(service_type, (requests, cost))| ServiceCost {
                service_type: service_type.to_string(),
                requests,
                cost,
            })
            .collect();
        result.sort_by(|a, b| b.cost.total_cmp(&a.cost));
        result
    }

    /// The `limit` callers with the highest total spend
    #[must_use]
    pub fn top_callers(&self, limit: usize) -> Vec<CallerSpend> {
        let entries = self.entries.read();
        let mut grouped: HashMap<&str, (u64, f64)> = HashMap::new();
        for entry in entries.iter() {
            let slot = grouped.entry(&entry.caller_id).or_default();
            slot.0 += 1;
            slot.1 += entry.cost;
        }
        let mut result: Vec<_> = grouped
            .into_iter()
            .map(|(caller_id, (requests, cost))| CallerSpend {
                caller_id: caller_id.to_string(),
                requests,
                cost,
            })
            .collect();
        result.sort_by(|a, b| b.cost.total_cmp(&a.cost));
        result.truncate(limit);
        result
    }

    /// Cost and request counts per budget day, oldest first
    #[must_use]
    pub fn daily_breakdown(&self) -> Vec<DailyCost> {
        let entries = self.entries.read();
        let mut grouped: HashMap<String, (u64, f64)> = HashMap::new();
        for entry in entries.iter() {
            let millis = i64::try_from(entry.timestamp_millis).unwrap_or(i64::MAX);
            let date = DateTime::<Utc>::from_timestamp_millis(millis)
                .unwrap_or_default()
                .with_timezone(&self.timezone)
                .format("%Y-%m-%d")
                .to_string();
            let slot = grouped.entry(date).or_default();
            slot.0 += 1;
            slot.1 += entry.cost;
        }
        let mut result: Vec<_> = grouped
            .into_iter()
            .map(|(date, (requests, cost))| DailyCost {
                date,
                requests,
                cost,
            })
            .collect();
        result.sort_by(|a, b| a.date.cmp(&b.date));
        result
    }

    /// Delete entries older than `cutoff_millis`; returns how many were
    /// removed
    pub fn purge_older_than(&self, cutoff_millis: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| e.timestamp_millis >= cutoff_millis);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, "Purged expired cost log entries");
        }
        removed
    }

    /// Spawn a background task that purges entries past the retention
    /// horizon once per hour
    pub fn spawn_retention_job(
        self: &Arc<Self>,
        clock: Arc<dyn Clock>,
        retention_days: u32,
    ) -> tokio::task::JoinHandle<()> {
        let log = Arc::clone(self);
        let horizon_millis = u64::from(retention_days) * 24 * 3_600 * 1_000;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3_600));
            loop {
                interval.tick().await;
                let cutoff = clock.now_millis().saturating_sub(horizon_millis);
                log.purge_older_than(cutoff);
            }
        })
    }
}
