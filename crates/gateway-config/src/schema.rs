//! Configuration schema definitions.
//!
//! This module defines all configuration types with validation and defaults.
//! The configuration is immutable after startup; every component receives
//! the parts it needs at construction.

use chrono_tz::Tz;
use gateway_core::GatewayError;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// Main gateway configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct GatewayConfig {
    /// Daily budget ledger configuration
    #[validate(nested)]
    pub budget: BudgetConfig,

    /// Per-caller admission control configuration
    #[validate(nested)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker configuration
    #[validate(nested)]
    pub circuit: CircuitConfig,

    /// Response cache configuration
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Token pricing configuration
    #[validate(nested)]
    pub pricing: PricingConfig,

    /// Upstream completion service configuration
    #[validate(nested)]
    pub upstream: UpstreamConfig,

    /// Performance monitor thresholds
    #[validate(nested)]
    pub monitor: MonitorConfig,

    /// Cost log retention horizon in days
    pub retention_days: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitConfig::default(),
            cache: CacheConfig::default(),
            pricing: PricingConfig::default(),
            upstream: UpstreamConfig::default(),
            monitor: MonitorConfig::default(),
            retention_days: 90,
        }
    }
}

impl GatewayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` describing the first problem found
    pub fn validate_config(&self) -> Result<(), GatewayError> {
        self.validate()
            .map_err(|e| GatewayError::configuration(e.to_string()))?;

        for threshold in &self.budget.alert_thresholds {
            if !(1..=100).contains(threshold) {
                return Err(GatewayError::configuration(format!(
                    "alert threshold {threshold} out of range [1, 100]"
                )));
            }
        }
        if self.circuit.window.is_zero() || self.circuit.cooldown.is_zero() {
            return Err(GatewayError::configuration(
                "circuit window and cooldown must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Daily budget configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily spend limit in the billing currency
    #[validate(range(min = 0.000_001))]
    pub daily_limit: f64,

    /// Spend percentages at which alerts fire, each exactly once per day
    pub alert_thresholds: Vec<u8>,

    /// Fixed timezone defining the budget day boundary
    /// (business reporting alignment, not wall-clock UTC)
    pub timezone: Tz,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50_000.0,
            alert_thresholds: vec![50, 80, 95, 100],
            timezone: chrono_tz::Asia::Seoul,
        }
    }
}

/// Rate limiter configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per caller per sliding minute
    #[validate(range(min = 1))]
    pub requests_per_minute: u32,

    /// Optional token budget per caller per sliding minute
    pub tokens_per_minute: Option<u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 50,
            tokens_per_minute: None,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct CircuitConfig {
    /// Severe failures within `window` that open the circuit
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Rolling window over which failures are counted
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// Time the circuit stays open before permitting probes
    #[serde(with = "humantime_serde")]
    pub cooldown: Duration,

    /// Real upstream requests allowed while half-open
    #[validate(range(min = 1))]
    pub max_probes: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
            max_probes: 1,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL in seconds per service type; absent or zero disables caching
    /// for that service
    pub ttl_seconds_by_service: HashMap<String, u64>,
}

impl Validate for CacheConfig {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        Ok(())
    }
}

impl CacheConfig {
    /// TTL for a service type, `None` when caching is disabled for it
    #[must_use]
    pub fn ttl_for(&self, service_type: &str) -> Option<Duration> {
        match self.ttl_seconds_by_service.get(service_type) {
            Some(0) | None => None,
            Some(secs) => Some(Duration::from_secs(*secs)),
        }
    }
}

/// Per-model pricing override
#[derive(Debug, Clone, Deserialize)]
pub struct ModelPricing {
    /// Cost per 1K input tokens
    pub input_per_1k: f64,
    /// Cost per 1K output tokens
    pub output_per_1k: f64,
}

/// Token pricing configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct PricingConfig {
    /// Default cost per 1K input tokens
    #[validate(range(min = 0.0))]
    pub input_per_1k: f64,

    /// Default cost per 1K output tokens
    #[validate(range(min = 0.0))]
    pub output_per_1k: f64,

    /// Overrides keyed by model identifier
    pub model_overrides: HashMap<String, ModelPricing>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            input_per_1k: 3.9,
            output_per_1k: 19.5,
            model_overrides: HashMap::new(),
        }
    }
}

/// Upstream completion service configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the completion API
    #[validate(length(min = 1))]
    pub base_url: String,

    /// API key
    pub api_key: SecretString,

    /// Model identifier sent with every call
    #[validate(length(min = 1))]
    pub model: String,

    /// Hard deadline for a single upstream call
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Retries after the initial attempt for retryable failures
    pub max_retries: u32,

    /// Base delay for exponential retry backoff
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,

    /// Ceiling for retry backoff
    #[serde(with = "humantime_serde")]
    pub retry_max_delay: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.upstream.example".to_string(),
            api_key: SecretString::new(String::new()),
            model: "completion-large".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
        }
    }
}

/// Performance monitor thresholds (advisory signals only)
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct MonitorConfig {
    /// Rolling sample window in minutes
    #[validate(range(min = 1))]
    pub window_minutes: u32,

    /// Alert when success rate drops below this fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_success_rate: f64,

    /// Alert when P95 latency exceeds this duration
    #[serde(with = "humantime_serde")]
    pub max_p95_latency: Duration,

    /// Alert when cache hit rate drops below this fraction
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_cache_hit_rate: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_minutes: 60,
            min_success_rate: 0.8,
            max_p95_latency: Duration::from_secs(5),
            min_cache_hit_rate: 0.4,
        }
    }
}
