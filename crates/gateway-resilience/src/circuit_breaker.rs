//! Circuit breaker for isolating a failing upstream dependency.
//!
//! One breaker instance per logical upstream. The full record lives in the
//! shared state store and every transition goes through compare-and-swap,
//! so two gateway instances racing to open the circuit converge on a
//! single consistent state.
//!
//! # State transitions
//! ```text
//! Closed    -> Open:      severe-failure count reaches threshold in window
//! Open      -> Half-Open: cooldown elapsed (lazy, on next check)
//! Half-Open -> Closed:    probe succeeds (failure count reset)
//! Half-Open -> Open:      probe fails (cooldown restarts)
//! ```

use gateway_core::GatewayError;
use gateway_store::{Clock, StateStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded CAS retries before conservatively rejecting; contention this
/// heavy means another caller just transitioned the circuit anyway
const CAS_ATTEMPTS: u32 = 4;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Severe failures within `window` that open the circuit
    pub failure_threshold: u32,
    /// Rolling window over which failures are counted
    pub window: Duration,
    /// Time the circuit stays open before permitting probes
    pub cooldown: Duration,
    /// Real upstream requests allowed while half-open
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

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through; failures are counted
    Closed,
    /// Requests are rejected immediately without contacting upstream
    Open,
    /// A bounded number of probe requests test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable label for logs and samples
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// The record persisted in the state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CircuitRecord {
    state: CircuitState,
    failure_count: u32,
    window_start_millis: u64,
    opened_at_millis: u64,
    probes_issued: u32,
}

impl CircuitRecord {
    fn closed(now_millis: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            window_start_millis: now_millis,
            opened_at_millis: 0,
            probes_issued: 0,
        }
    }

    fn encode(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::internal(format!("circuit record encode: {e}")))
    }

    fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Outcome of a circuit admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitDecision {
    /// Circuit closed; proceed normally
    Allow,
    /// Circuit half-open; this request is a recovery probe
    AllowProbe,
    /// Circuit open; answer from fallback without contacting upstream
    Reject {
        /// Time until the next probe is permitted
        retry_after: Duration,
    },
}

/// Read-only view of the breaker for observability
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    /// Upstream dependency name
    pub upstream: String,
    /// Current state
    pub state: CircuitState,
    /// Severe failures in the current window
    pub failure_count: u32,
    /// When the circuit opened, epoch milliseconds (0 if never)
    pub opened_at_millis: u64,
}

/// Circuit breaker over the shared state store
pub struct CircuitBreaker {
    name: String,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: CircuitConfig,
}

impl CircuitBreaker {
    /// Create a breaker for the named upstream dependency
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        config: CircuitConfig,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            clock,
            config,
        }
    }

    /// Upstream dependency name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> String {
        format!("circuit:{}", self.name)
    }

    /// Admission check; must complete without contacting the upstream.
    ///
    /// The Open -> Half-Open transition is lazy: it happens here on the
    /// first check after the cooldown elapses.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn check(&self) -> Result<CircuitDecision, GatewayError> {
        let key = self.key();
        for _ in 0..CAS_ATTEMPTS {
            let raw = self.store.get(&key).await?;
            let Some(raw) = raw else {
                return Ok(CircuitDecision::Allow);
            };
            let Some(record) = CircuitRecord::decode(&raw) else {
                return Ok(CircuitDecision::Allow);
            };

            let now = self.clock.now_millis();
            match record.state {
                CircuitState::Closed => return Ok(CircuitDecision::Allow),

                CircuitState::Open => {
                    let reopens_at =
                        record.opened_at_millis + self.config.cooldown.as_millis() as u64;
                    if now < reopens_at {
                        return Ok(CircuitDecision::Reject {
                            retry_after: Duration::from_millis(reopens_at - now),
                        });
                    }
                    // Cooldown elapsed: claim the first probe slot
                    let mut next = record.clone();
                    next.state = CircuitState::HalfOpen;
                    next.probes_issued = 1;
                    if self.swap(&key, &raw, &next).await? {
                        info!(upstream = %self.name, "Circuit half-open, probing upstream");
                        return Ok(CircuitDecision::AllowProbe);
                    }
                }

                CircuitState::HalfOpen => {
                    if record.probes_issued >= self.config.max_probes {
                        return Ok(CircuitDecision::Reject {
                            retry_after: Duration::ZERO,
                        });
                    }
                    let mut next = record.clone();
                    next.probes_issued += 1;
                    if self.swap(&key, &raw, &next).await? {
                        return Ok(CircuitDecision::AllowProbe);
                    }
                }
            }
        }
        // Lost every CAS race; another caller holds the probe slot
        Ok(CircuitDecision::Reject {
            retry_after: Duration::ZERO,
        })
    }

    /// Record a successful upstream call
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn on_success(&self) -> Result<(), GatewayError> {
        let key = self.key();
        for _ in 0..CAS_ATTEMPTS {
            let Some(raw) = self.store.get(&key).await? else {
                return Ok(());
            };
            let Some(record) = CircuitRecord::decode(&raw) else {
                return Ok(());
            };
            match record.state {
                // A successful probe closes the circuit and resets counts
                CircuitState::HalfOpen => {
                    let next = CircuitRecord::closed(self.clock.now_millis());
                    if self.swap(&key, &raw, &next).await? {
                        info!(upstream = %self.name, "Circuit closed after successful probe");
                        return Ok(());
                    }
                }
                // Success under Closed needs no bookkeeping; success racing
                // an Open transition is stale and ignored
                CircuitState::Closed | CircuitState::Open => return Ok(()),
            }
        }
        Ok(())
    }

    /// Record a failed upstream call. Only severe failures (5xx, timeout,
    /// connection loss) count toward opening the circuit.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn on_failure(&self, error: &GatewayError) -> Result<(), GatewayError> {
        if !error.is_severe() {
            debug!(upstream = %self.name, class = error.error_class(), "Non-severe failure ignored by circuit");
            return Ok(());
        }

        let key = self.key();
        for _ in 0..CAS_ATTEMPTS {
            let now = self.clock.now_millis();
            let raw = self.store.get(&key).await?;
            let record = raw
                .as_deref()
                .and_then(CircuitRecord::decode)
                .unwrap_or_else(|| CircuitRecord::closed(now));

            let next = match record.state {
                CircuitState::Closed => {
                    let mut next = record.clone();
                    let window_millis = self.config.window.as_millis() as u64;
                    if now.saturating_sub(next.window_start_millis) > window_millis {
                        // Stale window: restart counting from this failure
                        next.window_start_millis = now;
                        next.failure_count = 1;
                    } else {
                        next.failure_count += 1;
                    }
                    if next.failure_count >= self.config.failure_threshold {
                        next.state = CircuitState::Open;
                        next.opened_at_millis = now;
                        next.probes_issued = 0;
                        warn!(
                            upstream = %self.name,
                            failures = next.failure_count,
                            "Circuit opened"
                        );
                    }
                    next
                }
                // Failed probe: reopen and restart the cooldown
                CircuitState::HalfOpen => {
                    warn!(upstream = %self.name, "Probe failed, circuit reopened");
                    let mut next = record.clone();
                    next.state = CircuitState::Open;
                    next.opened_at_millis = now;
                    next.probes_issued = 0;
                    next
                }
                // Already open; nothing to record
                CircuitState::Open => return Ok(()),
            };

            if self.swap_or_create(&key, raw.as_deref(), &next).await? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Return an unused probe slot claimed by [`check`](Self::check).
    ///
    /// Used when a probe request is stopped by a later admission stage
    /// (budget, rate limit) before reaching the upstream, so the slot does
    /// not stay consumed with no probe in flight.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn abandon_probe(&self) -> Result<(), GatewayError> {
        let key = self.key();
        for _ in 0..CAS_ATTEMPTS {
            let Some(raw) = self.store.get(&key).await? else {
                return Ok(());
            };
            let Some(record) = CircuitRecord::decode(&raw) else {
                return Ok(());
            };
            if record.state != CircuitState::HalfOpen || record.probes_issued == 0 {
                return Ok(());
            }
            let mut next = record.clone();
            next.probes_issued -= 1;
            if self.swap(&key, &raw, &next).await? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Read-only snapshot for the observability surface
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn snapshot(&self) -> Result<CircuitSnapshot, GatewayError> {
        let record = self
            .store
            .get(&self.key())
            .await?
            .as_deref()
            .and_then(CircuitRecord::decode)
            .unwrap_or_else(|| CircuitRecord::closed(self.clock.now_millis()));
        Ok(CircuitSnapshot {
            upstream: self.name.clone(),
            state: record.state,
            failure_count: record.failure_count,
            opened_at_millis: record.opened_at_millis,
        })
    }

    async fn swap(
        &self,
        key: &str,
        current_raw: &str,
        next: &CircuitRecord,
    ) -> Result<bool, GatewayError> {
        self.swap_or_create(key, Some(current_raw), next).await
    }

    async fn swap_or_create(
        &self,
        key: &str,
        current_raw: Option<&str>,
        next: &CircuitRecord,
    ) -> Result<bool, GatewayError> {
        let encoded = next.encode()?;
        Ok(self
            .store
            .compare_and_swap(key, current_raw, &encoded, None)
            .await?)
    }
}
