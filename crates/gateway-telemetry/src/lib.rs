//! # Gateway Telemetry
//!
//! Observability for the gateway:
//! - Structured logging configuration over `tracing`
//! - An append-only cost log, the source of truth for spend analytics
//! - A rolling-window performance monitor with percentile latencies and
//!   advisory alerts

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cost_log;
pub mod logging;
pub mod monitor;

pub use cost_log::{
    CallerSpend, CostLog, CostLogEntry, CostSummary, DailyCost, ServiceCost,
};
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use monitor::{
    MonitorAlerts, MonitorThresholds, PerformanceMonitor, PerformanceSample, PerformanceStats,
};
