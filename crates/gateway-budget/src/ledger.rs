//! Daily budget ledger over the shared state store.
//!
//! Spend is tracked as an integer micro-unit counter per budget day so the
//! reserve/commit/release cycle reduces to atomic increments. A request
//! reserves its worst-case estimated cost before the upstream call; on
//! success the reservation is adjusted to the actual billed cost, on
//! failure it is released in full. The budget day boundary follows a fixed
//! configured timezone, not UTC.
//!
//! Threshold alerts are deduplicated through a store set keyed by day, so
//! across all gateway instances each threshold fires exactly once per day.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use gateway_core::GatewayError;
use gateway_store::{Clock, StateStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Micro-units per unit of the billing currency
const MICROS: f64 = 1_000_000.0;
/// Day keys outlive the budget day they describe by one day
const DAY_KEY_TTL: Duration = Duration::from_secs(48 * 3_600);
/// Capacity of the alert broadcast channel
const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Ledger configuration
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Daily spend limit in the billing currency
    pub daily_limit: f64,
    /// Spend percentages at which alerts fire
    pub alert_thresholds: Vec<u8>,
    /// Fixed timezone defining the budget day boundary
    pub timezone: Tz,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            daily_limit: 50_000.0,
            alert_thresholds: vec![50, 80, 95, 100],
            timezone: chrono_tz::Asia::Seoul,
        }
    }
}

/// Alert severity, derived from the crossed threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// Informational, spend is on track
    Info,
    /// Spend is running ahead of plan
    Warning,
    /// Spend is close to the daily limit
    Critical,
    /// The daily limit has been reached
    Exceeded,
}

impl AlertSeverity {
    fn for_threshold(threshold: u8) -> Self {
        match threshold {
            100.. => Self::Exceeded,
            95..=99 => Self::Critical,
            80..=94 => Self::Warning,
            _ => Self::Info,
        }
    }
}

/// A budget threshold crossing
#[derive(Debug, Clone, Serialize)]
pub struct BudgetAlert {
    /// Severity derived from the threshold
    pub severity: AlertSeverity,
    /// The crossed threshold as a percentage of the daily limit
    pub threshold: u8,
    /// Spend at the time of the crossing
    pub spent: f64,
    /// Budget remaining, zero when exceeded
    pub remaining: f64,
    /// Budget day the alert belongs to
    pub date: String,
}

/// A reservation of estimated spend, to be committed or released
#[derive(Debug, Clone)]
pub struct BudgetReservation {
    date: String,
    amount_micros: i64,
}

/// Outcome of a reservation attempt
#[derive(Debug, Clone)]
pub enum BudgetDecision {
    /// The estimated cost fits under the daily limit
    Reserved(BudgetReservation),
    /// The estimated cost would exceed the daily limit
    Blocked {
        /// Committed spend for the day, excluding the rejected estimate
        spent: f64,
        /// The daily limit
        limit: f64,
    },
}

/// Point-in-time view of the day's budget
#[derive(Debug, Clone, Serialize)]
pub struct BudgetStatus {
    /// Budget day
    pub date: String,
    /// Spend so far, including outstanding reservations
    pub spent: f64,
    /// The daily limit
    pub limit: f64,
    /// Budget remaining, never negative
    pub remaining: f64,
    /// Spend as a percentage of the limit
    pub utilization_percent: f64,
}

/// Daily budget ledger
pub struct BudgetLedger {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
    limit_micros: i64,
    alert_tx: broadcast::Sender<BudgetAlert>,
}

impl BudgetLedger {
    /// Create a ledger over the shared state store
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: LedgerConfig) -> Self {
        let (alert_tx, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let limit_micros = to_micros(config.daily_limit);
        Self {
            store,
            clock,
            config,
            limit_micros,
            alert_tx,
        }
    }

    /// Subscribe to budget threshold alerts
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BudgetAlert> {
        self.alert_tx.subscribe()
    }

    /// Reserve `estimated_cost` against today's budget.
    ///
    /// The reservation is speculative: a blocked request is rolled back
    /// immediately and leaves the ledger unchanged.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn check_and_reserve(
        &self,
        estimated_cost: f64,
    ) -> Result<BudgetDecision, GatewayError> {
        let date = self.current_date();
        let amount_micros = to_micros(estimated_cost);

        let total = self
            .store
            .incr_by(&spent_key(&date), amount_micros, Some(DAY_KEY_TTL))
            .await?;

        if total > self.limit_micros {
            self.store
                .incr_by(&spent_key(&date), -amount_micros, Some(DAY_KEY_TTL))
                .await?;
            let spent = from_micros(total - amount_micros);
            warn!(
                date,
                spent,
                limit = self.config.daily_limit,
                estimated = estimated_cost,
                "Budget exhausted, request blocked"
            );
            return Ok(BudgetDecision::Blocked {
                spent,
                limit: self.config.daily_limit,
            });
        }

        Ok(BudgetDecision::Reserved(BudgetReservation {
            date,
            amount_micros,
        }))
    }

    /// Settle a reservation at the actual billed cost and fire any newly
    /// crossed alert thresholds.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn commit(
        &self,
        reservation: BudgetReservation,
        actual_cost: f64,
    ) -> Result<(), GatewayError> {
        let actual_micros = to_micros(actual_cost);
        let adjustment = actual_micros - reservation.amount_micros;
        let total = self
            .store
            .incr_by(&spent_key(&reservation.date), adjustment, Some(DAY_KEY_TTL))
            .await?;

        self.emit_crossed_alerts(&reservation.date, total).await?;
        Ok(())
    }

    /// Return an unused reservation to the budget in full.
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn release(&self, reservation: BudgetReservation) -> Result<(), GatewayError> {
        if reservation.amount_micros != 0 {
            self.store
                .incr_by(
                    &spent_key(&reservation.date),
                    -reservation.amount_micros,
                    Some(DAY_KEY_TTL),
                )
                .await?;
        }
        Ok(())
    }

    /// Current budget utilization for today
    ///
    /// # Errors
    /// Returns `GatewayError::Store` if the state store fails
    pub async fn status(&self) -> Result<BudgetStatus, GatewayError> {
        let date = self.current_date();
        let spent_micros = match self.store.get(&spent_key(&date)).await? {
            Some(raw) => raw.parse::<i64>().unwrap_or(0),
            None => 0,
        };
        let spent = from_micros(spent_micros);
        Ok(BudgetStatus {
            date,
            spent,
            limit: self.config.daily_limit,
            remaining: (self.config.daily_limit - spent).max(0.0),
            utilization_percent: spent / self.config.daily_limit * 100.0,
        })
    }

    /// Fire each threshold at or below the current utilization exactly once
    /// per day, deduplicated through the store
    async fn emit_crossed_alerts(&self, date: &str, total_micros: i64) -> Result<(), GatewayError> {
        let percent = from_micros(total_micros) / self.config.daily_limit * 100.0;
        for &threshold in &self.config.alert_thresholds {
            if percent < f64::from(threshold) {
                continue;
            }
            let newly_crossed = self
                .store
                .set_add(&alerts_key(date), &threshold.to_string(), Some(DAY_KEY_TTL))
                .await?;
            if !newly_crossed {
                continue;
            }

            let spent = from_micros(total_micros);
            let alert = BudgetAlert {
                severity: AlertSeverity::for_threshold(threshold),
                threshold,
                spent,
                remaining: (self.config.daily_limit - spent).max(0.0),
                date: date.to_string(),
            };
            info!(
                threshold,
                spent,
                limit = self.config.daily_limit,
                severity = ?alert.severity,
                "Budget threshold crossed"
            );
            // Nobody listening is fine
            let _ = self.alert_tx.send(alert);
        }
        Ok(())
    }

    /// Today's date in the configured budget timezone
    fn current_date(&self) -> String {
        let millis = i64::try_from(self.clock.now_millis()).unwrap_or(i64::MAX);
        let utc = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default();
        utc.with_timezone(&self.config.timezone)
            .format("%Y-%m-%d")
            .to_string()
    }
}

fn spent_key(date: &str) -> String {
    format!("budget:{date}:spent")
}

fn alerts_key(date: &str) -> String {
    format!("budget:{date}:alerts")
}

fn to_micros(amount: f64) -> i64 {
    (amount * MICROS).round() as i64
}

fn from_micros(micros: i64) -> f64 {
    micros as f64 / MICROS
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_store::{ManualClock, MemoryStore};

    // 2026-03-10 00:00:00 UTC, i.e. 09:00 in Seoul
    const BASE_MILLIS: u64 = 1_773_100_800_000;

    fn ledger(daily_limit: f64) -> (Arc<ManualClock>, BudgetLedger) {
        let clock = Arc::new(ManualClock::new(BASE_MILLIS));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let config = LedgerConfig {
            daily_limit,
            ..LedgerConfig::default()
        };
        (clock.clone(), BudgetLedger::new(store, clock, config))
    }

    async fn spend(ledger: &BudgetLedger, cost: f64) {
        match ledger.check_and_reserve(cost).await.unwrap() {
            BudgetDecision::Reserved(r) => ledger.commit(r, cost).await.unwrap(),
            BudgetDecision::Blocked { .. } => panic!("unexpected block at {cost}"),
        }
    }

    #[tokio::test]
    async fn test_reserve_commit_release_cycle() {
        let (_, ledger) = ledger(100.0);

        let reservation = match ledger.check_and_reserve(40.0).await.unwrap() {
            BudgetDecision::Reserved(r) => r,
            BudgetDecision::Blocked { .. } => panic!("should fit"),
        };
        assert!((ledger.status().await.unwrap().spent - 40.0).abs() < 1e-6);

        // Actual cost came in below the estimate
        ledger.commit(reservation, 25.0).await.unwrap();
        assert!((ledger.status().await.unwrap().spent - 25.0).abs() < 1e-6);

        let reservation = match ledger.check_and_reserve(30.0).await.unwrap() {
            BudgetDecision::Reserved(r) => r,
            BudgetDecision::Blocked { .. } => panic!("should fit"),
        };
        ledger.release(reservation).await.unwrap();
        assert!((ledger.status().await.unwrap().spent - 25.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_blocks_at_limit_without_side_effects() {
        let (_, ledger) = ledger(100.0);
        spend(&ledger, 90.0).await;

        match ledger.check_and_reserve(20.0).await.unwrap() {
            BudgetDecision::Blocked { spent, limit } => {
                assert!((spent - 90.0).abs() < 1e-6);
                assert!((limit - 100.0).abs() < 1e-6);
            }
            BudgetDecision::Reserved(_) => panic!("should be blocked"),
        }
        // The rejected estimate left no residue
        assert!((ledger.status().await.unwrap().spent - 90.0).abs() < 1e-6);

        // A smaller request still fits
        assert!(matches!(
            ledger.check_and_reserve(10.0).await.unwrap(),
            BudgetDecision::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn test_threshold_alert_fires_once() {
        let (_, ledger) = ledger(100.0);
        let mut alerts = ledger.subscribe();

        // 96% utilization crosses 50, 80 and 95 in one commit
        spend(&ledger, 96.0).await;

        let mut thresholds = Vec::new();
        while let Ok(alert) = alerts.try_recv() {
            thresholds.push(alert.threshold);
        }
        assert_eq!(thresholds, vec![50, 80, 95]);

        // Further spend below 100% fires nothing new
        spend(&ledger, 1.0).await;
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_exceeded_alert_severity() {
        let (_, ledger) = ledger(100.0);
        let mut alerts = ledger.subscribe();

        spend(&ledger, 100.0).await;

        let severities: Vec<_> = std::iter::from_fn(|| alerts.try_recv().ok())
            .map(|a| a.severity)
            .collect();
        assert_eq!(
            severities,
            vec![
                AlertSeverity::Info,
                AlertSeverity::Warning,
                AlertSeverity::Critical,
                AlertSeverity::Exceeded,
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_crossings_deduplicate() {
        let clock = Arc::new(ManualClock::new(BASE_MILLIS));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let config = LedgerConfig {
            daily_limit: 100.0,
            ..LedgerConfig::default()
        };
        // Two gateway instances sharing one store
        let a = BudgetLedger::new(store.clone(), clock.clone(), config.clone());
        let b = BudgetLedger::new(store, clock, config);
        let mut alerts_a = a.subscribe();
        let mut alerts_b = b.subscribe();

        spend(&a, 45.0).await;
        spend(&b, 45.0).await;

        // 90% total: each threshold crossed on exactly one instance
        let fired_a: Vec<_> = std::iter::from_fn(|| alerts_a.try_recv().ok())
            .map(|al| al.threshold)
            .collect();
        let fired_b: Vec<_> = std::iter::from_fn(|| alerts_b.try_recv().ok())
            .map(|al| al.threshold)
            .collect();
        let mut all = [fired_a, fired_b].concat();
        all.sort_unstable();
        assert_eq!(all, vec![50, 80]);
    }

    #[tokio::test]
    async fn test_budget_day_follows_configured_timezone() {
        let (clock, ledger) = ledger(100.0);
        spend(&ledger, 60.0).await;

        // 14 hours later it is 23:00 in Seoul, still the same budget day
        clock.advance(Duration::from_secs(14 * 3_600));
        assert!((ledger.status().await.unwrap().spent - 60.0).abs() < 1e-6);

        // Two more hours roll the Seoul day over; the ledger starts fresh
        clock.advance(Duration::from_secs(2 * 3_600));
        let status = ledger.status().await.unwrap();
        assert_eq!(status.spent, 0.0);
        assert!((status.remaining - 100.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_status_math() {
        let (_, ledger) = ledger(200.0);
        spend(&ledger, 50.0).await;

        let status = ledger.status().await.unwrap();
        assert!((status.spent - 50.0).abs() < 1e-6);
        assert!((status.remaining - 150.0).abs() < 1e-6);
        assert!((status.utilization_percent - 25.0).abs() < 1e-6);
    }
}
