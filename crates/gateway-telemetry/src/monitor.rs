//! Rolling-window performance analytics.
//!
//! Samples are retained per service type for a fixed window (default 60
//! minutes) and pruned on every write; nothing is archived. Percentiles
//! are computed by sorting the in-window latencies and indexing at
//! `floor(n * percentile)`. Alerts here are advisory signals for an
//! external observability consumer; they never change gateway behavior.

use gateway_store::Clock;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// One observation of a completed request
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSample {
    /// Completion time, epoch milliseconds
    pub timestamp_millis: u64,
    /// Service type of the request
    pub service_type: String,
    /// End-to-end latency in milliseconds
    pub response_time_ms: u64,
    /// Whether the caller received real upstream content
    pub success: bool,
    /// Whether the response came from the cache
    pub cache_hit: bool,
    /// Cost billed
    pub cost: f64,
    /// Circuit state at completion time
    pub circuit_state: String,
}

/// Alerting thresholds, all advisory
#[derive(Debug, Clone)]
pub struct MonitorThresholds {
    /// Rolling sample window
    pub window: Duration,
    /// Alert when success rate drops below this fraction
    pub min_success_rate: f64,
    /// Alert when P95 latency exceeds this duration
    pub max_p95_latency: Duration,
    /// Alert when cache hit rate drops below this fraction; only evaluated
    /// for services registered via
    /// [`PerformanceMonitor::with_cached_services`]
    pub min_cache_hit_rate: f64,
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3_600),
            min_success_rate: 0.8,
            max_p95_latency: Duration::from_secs(5),
            min_cache_hit_rate: 0.4,
        }
    }
}

/// Windowed statistics for one service type
#[derive(Debug, Clone, Default, Serialize)]
pub struct PerformanceStats {
    /// Samples in the window
    pub sample_count: usize,
    /// Median latency in milliseconds
    pub p50_ms: u64,
    /// 95th percentile latency in milliseconds
    pub p95_ms: u64,
    /// 99th percentile latency in milliseconds
    pub p99_ms: u64,
    /// Fraction of samples that succeeded
    pub success_rate: f64,
    /// Fraction of samples answered from the cache
    pub cache_hit_rate: f64,
    /// Mean cost per sample
    pub avg_cost: f64,
}

/// Advisory alert evaluation across all service types
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorAlerts {
    /// Whether any threshold is currently breached
    pub active: bool,
    /// Human-readable breach descriptions
    pub reasons: Vec<String>,
}

/// Rolling-window monitor, one sample deque per service type
pub struct PerformanceMonitor {
    samples: RwLock<HashMap<String, VecDeque<PerformanceSample>>>,
    clock: Arc<dyn Clock>,
    thresholds: MonitorThresholds,
    cached_services: HashSet<String>,
}

impl PerformanceMonitor {
    /// Create a monitor with the given thresholds
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, thresholds: MonitorThresholds) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            clock,
            thresholds,
            cached_services: HashSet::new(),
        }
    }

    /// Register the service types that have caching enabled. Services not
    /// listed here have a structurally zero hit rate, so the hit-rate
    /// threshold is not evaluated for them.
    #[must_use]
    pub fn with_cached_services<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cached_services = services.into_iter().map(Into::into).collect();
        self
    }

    /// Record one sample and prune anything that has left the window
    pub fn record(&self, sample: PerformanceSample) {
        let cutoff = self.cutoff_millis();
        let mut samples = self.samples.write();
        let deque = samples.entry(sample.service_type.clone()).or_default();
        deque.push_back(sample);
        while deque.front().is_some_and(|s| s.timestamp_millis < cutoff) {
            deque.pop_front();
        }
    }

    /// Windowed statistics for `service_type`; zeroed when no samples
    #[must_use]
    pub fn stats(&self, service_type: &str) -> PerformanceStats {
        let cutoff = self.cutoff_millis();
        let samples = self.samples.read();
        let Some(deque) = samples.get(service_type) else {
            return PerformanceStats::default();
        };

        let window: Vec<&PerformanceSample> = deque
            .iter()
            .filter(|s| s.timestamp_millis >= cutoff)
            .collect();
        if window.is_empty() {
            return PerformanceStats::default();
        }

        let mut latencies: Vec<u64> = window.iter().map(|s| s.response_time_ms).collect();
        latencies.sort_unstable();
        let n = window.len();
        let successes = window.iter().filter(|s| s.success).count();
        let cache_hits = window.iter().filter(|s| s.cache_hit).count();
        let total_cost: f64 = window.iter().map(|s| s.cost).sum();

        PerformanceStats {
            sample_count: n,
            p50_ms: percentile(&latencies, 0.50),
            p95_ms: percentile(&latencies, 0.95),
            p99_ms: percentile(&latencies, 0.99),
            success_rate: successes as f64 / n as f64,
            cache_hit_rate: cache_hits as f64 / n as f64,
            avg_cost: total_cost / n as f64,
        }
    }

    /// Service types with at least one retained sample
    #[must_use]
    pub fn service_types(&self) -> Vec<String> {
        self.samples.read().keys().cloned().collect()
    }

    /// In-window samples for `service_type`, oldest first
    #[must_use]
    pub fn recent_samples(&self, service_type: &str) -> Vec<PerformanceSample> {
        let cutoff = self.cutoff_millis();
        self.samples
            .read()
            .get(service_type)
            .map(|deque| {
                deque
                    .iter()
                    .filter(|s| s.timestamp_millis >= cutoff)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evaluate all thresholds across all service types
    #[must_use]
    pub fn check_alerts(&self) -> MonitorAlerts {
        let mut reasons = Vec::new();
        for service_type in self.service_types() {
            let stats = self.stats(&service_type);
            if stats.sample_count == 0 {
                continue;
            }
            if stats.success_rate < self.thresholds.min_success_rate {
                reasons.push(format!(
                    "{service_type}: success rate {:.1}% below {:.1}%",
                    stats.success_rate * 100.0,
                    self.thresholds.min_success_rate * 100.0
                ));
            }
            let max_p95_ms = self.thresholds.max_p95_latency.as_millis() as u64;
            if stats.p95_ms > max_p95_ms {
                reasons.push(format!(
                    "{service_type}: p95 latency {}ms above {max_p95_ms}ms",
                    stats.p95_ms
                ));
            }
            if self.cached_services.contains(&service_type)
                && stats.cache_hit_rate < self.thresholds.min_cache_hit_rate
            {
                reasons.push(format!(
                    "{service_type}: cache hit rate {:.1}% below {:.1}%",
                    stats.cache_hit_rate * 100.0,
                    self.thresholds.min_cache_hit_rate * 100.0
                ));
            }
        }
        reasons.sort();
        MonitorAlerts {
            active: !reasons.is_empty(),
            reasons,
        }
    }

    fn cutoff_millis(&self) -> u64 {
        self.clock
            .now_millis()
            .saturating_sub(self.thresholds.window.as_millis() as u64)
    }
}

/// Index into a sorted slice at `floor(n * p)`, clamped to the last element
fn percentile(sorted: &[u64], p: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}
