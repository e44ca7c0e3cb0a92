//! The gateway orchestrator.
//!
//! Per-request sequencing: cache lookup (a hit short-circuits everything),
//! circuit check, budget reservation, rate-limit admission, then the
//! upstream call under a deadline with bounded retries. Every completed
//! attempt lands in the cost log and the performance monitor regardless of
//! how it ended. All upstream failures and admission rejections are
//! answered with fallback content; only structural errors (validation,
//! configuration, upstream authentication) reach the caller as errors.

use gateway_budget::{
    BudgetAlert, BudgetDecision, BudgetLedger, BudgetStatus, LedgerConfig, PricingModel,
    TokenRates,
};
use gateway_config::GatewayConfig;
use gateway_core::{
    CompletionCall, CompletionClient, GatewayError, GatewayOutcome, GatewayRequest,
};
use gateway_fallback::FallbackSelector;
use gateway_resilience::{
    cache::CachedResponse, circuit_breaker::CircuitConfig, rate_limiter::LimiterConfig,
    retry::RetryConfig, with_deadline, CacheStats, CircuitBreaker, CircuitDecision,
    CircuitSnapshot, RateLimitDecision, ResponseCache, RetryPolicy, SlidingWindowLimiter,
};
use gateway_store::{Clock, StateStore};
use gateway_telemetry::{
    CostLog, CostLogEntry, MonitorAlerts, MonitorThresholds, PerformanceMonitor,
    PerformanceSample, PerformanceStats,
};
use gateway_upstream::HttpCompletionClient;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Name labelling the upstream dependency in circuit state and logs
const UPSTREAM_NAME: &str = "completion-api";

/// The resilience gateway.
///
/// Constructed once with its dependencies injected; all shared state lives
/// in the state store, so any number of gateway instances over the same
/// store behave as one.
pub struct Gateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    upstream: Arc<dyn CompletionClient>,
    cache: ResponseCache,
    circuit: CircuitBreaker,
    ledger: BudgetLedger,
    limiter: SlidingWindowLimiter,
    retry: RetryPolicy,
    fallback: FallbackSelector,
    pricing: PricingModel,
    cost_log: Arc<CostLog>,
    monitor: PerformanceMonitor,
}

impl Gateway {
    /// Build a gateway from validated configuration and injected
    /// dependencies
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the configuration is invalid
    pub fn new(
        config: GatewayConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        upstream: Arc<dyn CompletionClient>,
    ) -> Result<Self, GatewayError> {
        config.validate_config()?;

        let ttl_by_service: HashMap<String, Duration> = config
            .cache
            .ttl_seconds_by_service
            .iter()
            .map(|(service, secs)| (service.clone(), Duration::from_secs(*secs)))
            .collect();
        let cache = ResponseCache::new(Arc::clone(&store), ttl_by_service);

        let circuit = CircuitBreaker::new(
            UPSTREAM_NAME,
            Arc::clone(&store),
            Arc::clone(&clock),
            CircuitConfig {
                failure_threshold: config.circuit.failure_threshold,
                window: config.circuit.window,
                cooldown: config.circuit.cooldown,
                max_probes: config.circuit.max_probes,
            },
        );

        let ledger = BudgetLedger::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            LedgerConfig {
                daily_limit: config.budget.daily_limit,
                alert_thresholds: config.budget.alert_thresholds.clone(),
                timezone: config.budget.timezone,
            },
        );

        let limiter = SlidingWindowLimiter::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            LimiterConfig {
                requests_per_minute: config.rate_limit.requests_per_minute,
                tokens_per_minute: config.rate_limit.tokens_per_minute,
            },
        );

        let retry = RetryPolicy::new(RetryConfig {
            max_retries: config.upstream.max_retries,
            base_delay: config.upstream.retry_base_delay,
            max_delay: config.upstream.retry_max_delay,
        });

        let mut pricing =
            PricingModel::new(config.pricing.input_per_1k, config.pricing.output_per_1k);
        for (model, rates) in &config.pricing.model_overrides {
            pricing = pricing.with_override(
                model.clone(),
                TokenRates {
                    input_per_1k: rates.input_per_1k,
                    output_per_1k: rates.output_per_1k,
                },
            );
        }

        let cost_log = Arc::new(CostLog::new(config.budget.timezone));
        let monitor = PerformanceMonitor::new(
            Arc::clone(&clock),
            MonitorThresholds {
                window: Duration::from_secs(u64::from(config.monitor.window_minutes) * 60),
                min_success_rate: config.monitor.min_success_rate,
                max_p95_latency: config.monitor.max_p95_latency,
                min_cache_hit_rate: config.monitor.min_cache_hit_rate,
            },
        )
        .with_cached_services(
            config
                .cache
                .ttl_seconds_by_service
                .iter()
                .filter(|(_, secs)| **secs > 0)
                .map(|(service, _)| service.clone()),
        );

        Ok(Self {
            config,
            clock,
            upstream,
            cache,
            circuit,
            ledger,
            limiter,
            retry,
            fallback: FallbackSelector::new(),
            pricing,
            cost_log,
            monitor,
        })
    }

    /// Build a gateway talking to the real HTTP upstream from the
    /// configuration's `upstream` section
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the configuration is invalid
    /// or the HTTP client cannot be constructed
    pub fn with_http_upstream(
        config: GatewayConfig,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GatewayError> {
        let upstream = HttpCompletionClient::new(config.upstream.clone())?;
        Self::new(config, store, clock, Arc::new(upstream))
    }

    /// Execute one request end to end.
    ///
    /// # Errors
    /// Only structural errors surface: `Validation`, `Configuration`, or
    /// `UpstreamAuth`. Every other failure is absorbed into a fallback
    /// outcome with `fallback_used: true` and zero cost.
    #[instrument(skip(self, request), fields(service = %request.service_type, caller = %request.caller_id))]
    pub async fn execute(&self, request: GatewayRequest) -> Result<GatewayOutcome, GatewayError> {
        let started = self.clock.now_millis();
        match self.try_execute(&request, started).await {
            Ok(outcome) => Ok(outcome),
            Err(error) if error.is_structural() => {
                let circuit_state = self.circuit_state_label().await;
                self.record_attempt(&request, started, 0.0, 0, 0, false, false, Some(&error), circuit_state);
                Err(error)
            }
            Err(error) => Ok(self.fallback_outcome(&request, &error, started).await),
        }
    }

    async fn try_execute(
        &self,
        request: &GatewayRequest,
        started: u64,
    ) -> Result<GatewayOutcome, GatewayError> {
        // Requests can be hand-built as struct literals; re-check the
        // builder's invariants here
        request.validate()?;
        let service = request.service_type.as_str();

        if let Some(hit) = self.cache.get(service, &request.fingerprint).await? {
            let duration = self.elapsed(started);
            let circuit_state = self.circuit_state_label().await;
            self.record_attempt(request, started, 0.0, 0, 0, true, true, None, circuit_state);
            return Ok(GatewayOutcome {
                content: hit.content,
                cached: true,
                fallback_used: false,
                fallback_category: None,
                cost: 0.0,
                input_tokens: hit.input_tokens,
                output_tokens: hit.output_tokens,
                duration,
            });
        }

        let decision = self.circuit.check().await?;
        let is_probe = decision == CircuitDecision::AllowProbe;
        if let CircuitDecision::Reject { retry_after } = decision {
            return Err(GatewayError::CircuitOpen {
                upstream: self.circuit.name().to_string(),
                retry_after: Some(retry_after),
            });
        }

        let estimated_input = estimate_tokens(&request.payload);
        let estimate =
            self.pricing
                .estimate(&self.config.upstream.model, estimated_input, request.max_tokens);
        let reservation = match self.ledger.check_and_reserve(estimate).await? {
            BudgetDecision::Reserved(reservation) => reservation,
            BudgetDecision::Blocked { spent, limit } => {
                if is_probe {
                    self.circuit.abandon_probe().await?;
                }
                return Err(GatewayError::BudgetExceeded { spent, limit });
            }
        };

        let admission = self
            .limiter
            .allow(&request.caller_id, estimated_input + request.max_tokens)
            .await?;
        if !admission.allowed {
            self.ledger.release(reservation).await?;
            if is_probe {
                self.circuit.abandon_probe().await?;
            }
            return Err(GatewayError::RateLimited {
                caller: request.caller_id.clone(),
                retry_after: admission.retry_after,
            });
        }

        let call = CompletionCall {
            model: self.config.upstream.model.clone(),
            prompt: request.payload.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let deadline = self.config.upstream.timeout;
        let result = self
            .retry
            .execute(|_| with_deadline(self.upstream.complete(&call), deadline))
            .await;

        match result {
            Ok(reply) => {
                let cost = self.pricing.cost(
                    &self.config.upstream.model,
                    reply.input_tokens,
                    reply.output_tokens,
                );
                self.ledger.commit(reservation, cost).await?;
                // The reply is billed from here on; circuit and cache
                // bookkeeping must not turn it into a fallback
                if let Err(error) = self.circuit.on_success().await {
                    warn!(class = error.error_class(), "Circuit success update failed after billing");
                }
                let put = self
                    .cache
                    .put(
                        service,
                        &request.fingerprint,
                        &CachedResponse {
                            content: reply.text.clone(),
                            input_tokens: reply.input_tokens,
                            output_tokens: reply.output_tokens,
                            created_at_millis: self.clock.now_millis(),
                        },
                    )
                    .await;
                if let Err(error) = put {
                    warn!(class = error.error_class(), "Cache write failed after billing");
                }

                let duration = self.elapsed(started);
                let circuit_state = if is_probe { "half_open" } else { "closed" };
                self.record_attempt(
                    request,
                    started,
                    cost,
                    reply.input_tokens,
                    reply.output_tokens,
                    true,
                    false,
                    None,
                    circuit_state,
                );
                info!(cost, duration_ms = duration.as_millis() as u64, "Request served from upstream");
                Ok(GatewayOutcome {
                    content: reply.text,
                    cached: false,
                    fallback_used: false,
                    fallback_category: None,
                    cost,
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration,
                })
            }
            Err(error) => {
                // Failed attempts are never billed; timeouts included
                self.ledger.release(reservation).await?;
                self.circuit.on_failure(&error).await?;
                if is_probe && !error.is_severe() {
                    // A probe that failed for a non-severe reason neither
                    // reopens nor closes the circuit; free its slot
                    self.circuit.abandon_probe().await?;
                }
                Err(error)
            }
        }
    }

    /// Build a fallback outcome for an absorbed failure
    async fn fallback_outcome(
        &self,
        request: &GatewayRequest,
        error: &GatewayError,
        started: u64,
    ) -> GatewayOutcome {
        let selection = self.fallback.select(request);
        let circuit_state = self.circuit_state_label().await;
        warn!(
            class = error.error_class(),
            category = selection.category.as_str(),
            "Answering with fallback content"
        );
        self.record_attempt(request, started, 0.0, 0, 0, false, false, Some(error), circuit_state);
        GatewayOutcome {
            content: selection.content,
            cached: false,
            fallback_used: true,
            fallback_category: Some(selection.category.as_str().to_string()),
            cost: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration: self.elapsed(started),
        }
    }

    /// Record one completed attempt in the cost log and the monitor.
    /// Best-effort by construction; neither sink can fail the request.
    #[allow(clippy::too_many_arguments)]
    fn record_attempt(
        &self,
        request: &GatewayRequest,
        started: u64,
        cost: f64,
        input_tokens: u32,
        output_tokens: u32,
        success: bool,
        cache_hit: bool,
        error: Option<&GatewayError>,
        circuit_state: &str,
    ) {
        let now = self.clock.now_millis();
        let duration_ms = now.saturating_sub(started);
        self.cost_log.record(CostLogEntry {
            id: Uuid::new_v4(),
            timestamp_millis: now,
            service_type: request.service_type.as_str().to_string(),
            caller_id: request.caller_id.clone(),
            org_id: request.org_id.clone(),
            input_tokens,
            output_tokens,
            cost,
            duration_ms,
            success,
            cache_hit,
            error_class: error.map(|e| e.error_class().to_string()),
        });
        self.monitor.record(PerformanceSample {
            timestamp_millis: now,
            service_type: request.service_type.as_str().to_string(),
            response_time_ms: duration_ms,
            success,
            cache_hit,
            cost,
            circuit_state: circuit_state.to_string(),
        });
    }

    fn elapsed(&self, started: u64) -> Duration {
        Duration::from_millis(self.clock.now_millis().saturating_sub(started))
    }

    /// Circuit state label for monitor samples; "closed" when the store is
    /// unreadable
    async fn circuit_state_label(&self) -> &'static str {
        match self.circuit.snapshot().await {
            Ok(snapshot) => snapshot.state.as_str(),
            Err(_) => "closed",
        }
    }

    /// Today's budget utilization
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn budget_status(&self) -> Result<BudgetStatus, GatewayError> {
        self.ledger.status().await
    }

    /// Current circuit breaker state
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn circuit_snapshot(&self) -> Result<CircuitSnapshot, GatewayError> {
        self.circuit.snapshot().await
    }

    /// Read-only rate-limit window for one caller
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn rate_limit_status(
        &self,
        caller_id: &str,
    ) -> Result<RateLimitDecision, GatewayError> {
        self.limiter.status(caller_id).await
    }

    /// Windowed performance statistics for one service type
    #[must_use]
    pub fn performance(&self, service_type: &str) -> PerformanceStats {
        self.monitor.stats(service_type)
    }

    /// Advisory performance alerts across all service types
    #[must_use]
    pub fn performance_alerts(&self) -> MonitorAlerts {
        self.monitor.check_alerts()
    }

    /// In-window raw performance samples for one service type, oldest first
    #[must_use]
    pub fn performance_samples(&self, service_type: &str) -> Vec<PerformanceSample> {
        self.monitor.recent_samples(service_type)
    }

    /// Local cache hit/miss counters
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The append-only cost log, for aggregate queries
    #[must_use]
    pub fn cost_log(&self) -> &Arc<CostLog> {
        &self.cost_log
    }

    /// Subscribe to budget threshold alerts
    #[must_use]
    pub fn subscribe_budget_alerts(&self) -> broadcast::Receiver<BudgetAlert> {
        self.ledger.subscribe()
    }

    /// Spawn the background cost-log retention job
    pub fn spawn_retention_job(&self) -> tokio::task::JoinHandle<()> {
        self.cost_log
            .spawn_retention_job(Arc::clone(&self.clock), self.config.retention_days)
    }
}

/// Rough prompt-size heuristic: four characters per token
fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count() / 4 + 1).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate_scales_with_length() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abcd"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 101);
    }
}
