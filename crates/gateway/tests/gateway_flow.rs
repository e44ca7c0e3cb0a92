//! End-to-end tests of the orchestrator over an in-memory store and a
//! scripted upstream.

use async_trait::async_trait;
use gateway::{
    CompletionCall, CompletionClient, CompletionReply, Gateway, GatewayError, GatewayRequest,
    ServiceType,
};
use gateway_budget::AlertSeverity;
use gateway_config::GatewayConfig;
use gateway_resilience::CircuitState;
use gateway_store::{ManualClock, MemoryStore, StateStore, StoreError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// 2026-03-10 00:00 UTC (09:00 in Seoul)
const BASE_MILLIS: u64 = 1_773_100_800_000;

/// Upstream double: pops scripted results, falls back to a fixed success
struct ScriptedUpstream {
    script: Mutex<VecDeque<Result<CompletionReply, GatewayError>>>,
    calls: AtomicU32,
}

impl ScriptedUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU32::new(0),
        })
    }

    fn push(&self, result: Result<CompletionReply, GatewayError>) {
        self.script.lock().push_back(result);
    }

    fn push_failures(&self, count: usize, error: GatewayError) {
        for _ in 0..count {
            self.push(Err(error.clone()));
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn reply(output_tokens: u32) -> CompletionReply {
    CompletionReply {
        text: "generated answer".to_string(),
        input_tokens: 100,
        output_tokens,
    }
}

#[async_trait]
impl CompletionClient for ScriptedUpstream {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _call: &CompletionCall) -> Result<CompletionReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.lock().pop_front().unwrap_or_else(|| Ok(reply(200)))
    }
}

/// Store double that rejects writes to cache keys but behaves normally
/// everywhere else
struct CacheWriteFailingStore {
    inner: MemoryStore,
}

#[async_trait]
impl StateStore for CacheWriteFailingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if key.starts_with("cache:") {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.inner.set(key, value, ttl).await
    }

    async fn incr_by(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<i64, StoreError> {
        self.inner.incr_by(key, delta, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }

    async fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.inner.set_add(key, member, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

/// Config tuned for determinism: no retries, cost = output tokens
fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.max_retries = 0;
    config.pricing.input_per_1k = 0.0;
    config.pricing.output_per_1k = 1_000.0;
    config.rate_limit.requests_per_minute = 1_000;
    config
}

fn gateway(config: GatewayConfig) -> (Arc<ManualClock>, Arc<ScriptedUpstream>, Gateway) {
    // Start on a minute boundary so rate-limit buckets begin empty
    let clock = Arc::new(ManualClock::new(BASE_MILLIS));
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let upstream = ScriptedUpstream::new();
    let gateway = Gateway::new(config, store, clock.clone(), upstream.clone())
        .expect("valid configuration");
    (clock, upstream, gateway)
}

fn qa_request(fingerprint: &str, payload: &str) -> GatewayRequest {
    GatewayRequest::builder()
        .service_type(ServiceType::QA)
        .fingerprint(fingerprint)
        .payload(payload)
        .caller_id("qa-service")
        .org_id("org-1")
        .max_tokens(10)
        .build()
        .expect("valid request")
}

fn server_error() -> GatewayError {
    GatewayError::upstream_server(Some(503), "service unavailable")
}

#[tokio::test]
async fn test_successful_call_bills_and_reports() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push(Ok(reply(42)));

    let outcome = gateway.execute(qa_request("fp-1", "hello")).await.unwrap();
    assert!(!outcome.cached);
    assert!(!outcome.fallback_used);
    assert_eq!(outcome.content, "generated answer");
    assert_eq!(outcome.tokens_used(), 142);
    assert!((outcome.cost - 42.0).abs() < 1e-6);

    let status = gateway.budget_status().await.unwrap();
    assert!((status.spent - 42.0).abs() < 1e-6);
    let summary = gateway.cost_log().summary(0, u64::MAX);
    assert_eq!(summary.total_requests, 1);
    assert_eq!(summary.successes, 1);
}

#[tokio::test]
async fn test_five_server_errors_open_the_circuit() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push_failures(5, server_error());

    for i in 0..5 {
        let outcome = gateway
            .execute(qa_request(&format!("fp-{i}"), "some question"))
            .await
            .unwrap();
        assert!(outcome.fallback_used, "attempt {i}");
        assert_eq!(outcome.cost, 0.0);
    }
    assert_eq!(upstream.calls(), 5);
    assert_eq!(
        gateway.circuit_snapshot().await.unwrap().state,
        CircuitState::Open
    );

    // Request #6 never reaches upstream and answers fast
    let wall = std::time::Instant::now();
    let outcome = gateway
        .execute(qa_request("fp-6", "another question"))
        .await
        .unwrap();
    assert!(outcome.fallback_used);
    assert_eq!(outcome.fallback_category.as_deref(), Some("generic"));
    assert_eq!(outcome.cost, 0.0);
    assert_eq!(upstream.calls(), 5);
    assert!(wall.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_eligibility_fallback_while_circuit_open() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push_failures(5, server_error());
    for i in 0..5 {
        gateway
            .execute(qa_request(&format!("fp-{i}"), "question"))
            .await
            .unwrap();
    }

    let outcome = gateway
        .execute(qa_request("fp-elig", "Is my company eligible for this grant?"))
        .await
        .unwrap();
    assert!(outcome.fallback_used);
    assert_eq!(outcome.fallback_category.as_deref(), Some("eligibility"));
    assert_eq!(upstream.calls(), 5);
}

#[tokio::test]
async fn test_probe_success_closes_circuit() {
    let (clock, upstream, gateway) = gateway(test_config());
    upstream.push_failures(5, server_error());
    for i in 0..5 {
        gateway
            .execute(qa_request(&format!("fp-{i}"), "question"))
            .await
            .unwrap();
    }

    clock.advance(Duration::from_secs(31));
    upstream.push(Ok(reply(10)));
    let outcome = gateway.execute(qa_request("fp-probe", "question")).await.unwrap();
    assert!(!outcome.fallback_used);
    assert_eq!(
        gateway.circuit_snapshot().await.unwrap().state,
        CircuitState::Closed
    );
}

#[tokio::test]
async fn test_budget_exhaustion_blocks_before_upstream() {
    let (_, upstream, gateway) = gateway(test_config());
    // One call spends the whole 50,000 daily limit
    upstream.push(Ok(reply(50_000)));
    gateway.execute(qa_request("fp-big", "question")).await.unwrap();
    assert!((gateway.budget_status().await.unwrap().remaining).abs() < 1e-6);

    let limiter_before = gateway.rate_limit_status("qa-service").await.unwrap().remaining;
    let outcome = gateway.execute(qa_request("fp-next", "question")).await.unwrap();

    assert!(outcome.fallback_used);
    assert_eq!(outcome.cost, 0.0);
    // No upstream call, no limiter admission, no circuit movement
    assert_eq!(upstream.calls(), 1);
    assert_eq!(
        gateway.rate_limit_status("qa-service").await.unwrap().remaining,
        limiter_before
    );
    let circuit = gateway.circuit_snapshot().await.unwrap();
    assert_eq!(circuit.state, CircuitState::Closed);
    assert_eq!(circuit.failure_count, 0);
}

#[tokio::test]
async fn test_critical_alert_fires_exactly_once() {
    let (_, upstream, gateway) = gateway(test_config());
    let mut alerts = gateway.subscribe_budget_alerts();

    // 48,000 of 50,000 (96%) crosses the 50/80/95 thresholds
    upstream.push(Ok(reply(48_000)));
    gateway.execute(qa_request("fp-1", "question")).await.unwrap();
    // A further 100 stays under 100% and must not re-fire 95
    upstream.push(Ok(reply(100)));
    let outcome = gateway.execute(qa_request("fp-2", "question")).await.unwrap();
    assert!(!outcome.fallback_used);

    let fired: Vec<_> = std::iter::from_fn(|| alerts.try_recv().ok()).collect();
    let critical: Vec<_> = fired
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].threshold, 95);
}

#[tokio::test]
async fn test_cache_miss_hit_expiry_cycle() {
    let mut config = test_config();
    config
        .cache
        .ttl_seconds_by_service
        .insert("qa".to_string(), 3_600);
    let (clock, upstream, gateway) = gateway(config);

    let first = gateway.execute(qa_request("fp-same", "question")).await.unwrap();
    assert!(!first.cached);
    assert!(first.cost > 0.0);

    let second = gateway.execute(qa_request("fp-same", "question")).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.cost, 0.0);
    assert_eq!(second.content, first.content);
    assert_eq!(upstream.calls(), 1);

    clock.advance(Duration::from_secs(3_601));
    let third = gateway.execute(qa_request("fp-same", "question")).await.unwrap();
    assert!(!third.cached);
    assert_eq!(upstream.calls(), 2);

    let summary = gateway.cost_log().summary(0, u64::MAX);
    assert_eq!(summary.cache_hits, 1);
}

#[tokio::test]
async fn test_store_failure_after_billing_still_delivers_the_reply() {
    let mut config = test_config();
    config
        .cache
        .ttl_seconds_by_service
        .insert("qa".to_string(), 3_600);
    let clock = Arc::new(ManualClock::new(BASE_MILLIS));
    let store = Arc::new(CacheWriteFailingStore {
        inner: MemoryStore::new(clock.clone()),
    });
    let upstream = ScriptedUpstream::new();
    let gateway =
        Gateway::new(config, store, clock, upstream.clone()).expect("valid configuration");
    upstream.push(Ok(reply(42)));

    // The cache write fails after the charge lands; the billed reply must
    // still reach the caller, not a zero-cost fallback
    let outcome = gateway.execute(qa_request("fp-1", "question")).await.unwrap();
    assert!(!outcome.fallback_used);
    assert_eq!(outcome.content, "generated answer");
    assert!((outcome.cost - 42.0).abs() < 1e-6);

    // Ledger and audit trail agree on the billed amount
    assert!((gateway.budget_status().await.unwrap().spent - 42.0).abs() < 1e-6);
    let summary = gateway.cost_log().summary(0, u64::MAX);
    assert_eq!(summary.successes, 1);
    assert!((summary.total_cost - 42.0).abs() < 1e-6);
}

#[tokio::test]
async fn test_cache_hit_reports_live_circuit_state() {
    let mut config = test_config();
    config
        .cache
        .ttl_seconds_by_service
        .insert("qa".to_string(), 3_600);
    let (_, upstream, gateway) = gateway(config);

    gateway.execute(qa_request("fp-hot", "question")).await.unwrap();
    upstream.push_failures(5, server_error());
    for i in 0..5 {
        gateway
            .execute(qa_request(&format!("fp-{i}"), "question"))
            .await
            .unwrap();
    }
    assert_eq!(
        gateway.circuit_snapshot().await.unwrap().state,
        CircuitState::Open
    );

    let hit = gateway.execute(qa_request("fp-hot", "question")).await.unwrap();
    assert!(hit.cached);
    let samples = gateway.performance_samples("qa");
    let last = samples.last().unwrap();
    assert!(last.cache_hit);
    assert_eq!(last.circuit_state, "open");
}

#[tokio::test]
async fn test_hand_built_request_is_revalidated() {
    let (_, upstream, gateway) = gateway(test_config());
    let request = GatewayRequest {
        service_type: ServiceType::new("qa"),
        fingerprint: "fp-1".to_string(),
        payload: String::new(),
        max_tokens: 10,
        temperature: 0.7,
        caller_id: "qa-service".to_string(),
        org_id: String::new(),
        template_fields: Vec::new(),
    };

    let result = gateway.execute(request).await;
    assert!(matches!(result, Err(GatewayError::Validation { .. })));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn test_rate_limit_denial_falls_back_without_billing() {
    let mut config = test_config();
    config.rate_limit.requests_per_minute = 2;
    let (_, upstream, gateway) = gateway(config);

    for i in 0..2 {
        let outcome = gateway
            .execute(qa_request(&format!("fp-{i}"), "question"))
            .await
            .unwrap();
        assert!(!outcome.fallback_used);
    }
    let spent_before = gateway.budget_status().await.unwrap().spent;

    let denied = gateway.execute(qa_request("fp-3", "question")).await.unwrap();
    assert!(denied.fallback_used);
    assert_eq!(denied.cost, 0.0);
    assert_eq!(upstream.calls(), 2);
    // The released reservation leaves spend untouched
    let spent_after = gateway.budget_status().await.unwrap().spent;
    assert!((spent_after - spent_before).abs() < 1e-6);
}

#[tokio::test]
async fn test_auth_failure_surfaces_to_caller() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push(Err(GatewayError::upstream_auth("invalid api key")));

    let result = gateway.execute(qa_request("fp-1", "question")).await;
    assert!(matches!(result, Err(GatewayError::UpstreamAuth { .. })));
    // Nothing was billed for the failed attempt
    assert_eq!(gateway.budget_status().await.unwrap().spent, 0.0);
}

#[tokio::test]
async fn test_timeout_is_severe_and_unbilled() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push(Err(GatewayError::upstream_timeout(Duration::from_secs(30))));

    let outcome = gateway.execute(qa_request("fp-1", "question")).await.unwrap();
    assert!(outcome.fallback_used);
    assert_eq!(gateway.budget_status().await.unwrap().spent, 0.0);
    assert_eq!(gateway.circuit_snapshot().await.unwrap().failure_count, 1);

    let summary = gateway.cost_log().summary(0, u64::MAX);
    assert_eq!(summary.total_requests, 1);
    assert_eq!(summary.successes, 0);
    assert!((summary.total_cost).abs() < 1e-9);
}

#[tokio::test]
async fn test_explanation_fallback_uses_structured_fields() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push(Err(server_error()));

    let request = GatewayRequest::builder()
        .service_type(ServiceType::EXPLANATION)
        .fingerprint("fp-exp")
        .payload("explain the assessment result")
        .caller_id("explanation-service")
        .org_id("org-1")
        .max_tokens(10)
        .template_field("program_name", "Scale-Up Voucher")
        .template_field("organization_name", "Acme Industries")
        .template_field("score", "77")
        .build()
        .unwrap();

    let outcome = gateway.execute(request).await.unwrap();
    assert!(outcome.fallback_used);
    assert!(outcome.content.contains("Acme Industries"));
    assert!(outcome.content.contains("Scale-Up Voucher"));
    assert!(outcome.content.contains("77"));
}

#[tokio::test]
async fn test_performance_stats_accumulate() {
    let (_, upstream, gateway) = gateway(test_config());
    upstream.push(Ok(reply(10)));
    upstream.push(Err(server_error()));

    gateway.execute(qa_request("fp-1", "question")).await.unwrap();
    gateway.execute(qa_request("fp-2", "question")).await.unwrap();

    let stats = gateway.performance("qa");
    assert_eq!(stats.sample_count, 2);
    assert!((stats.success_rate - 0.5).abs() < 1e-9);
}
