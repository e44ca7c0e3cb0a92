//! # Gateway Config
//!
//! Configuration for the resilience gateway:
//! - A single immutable, validated configuration struct passed once at
//!   construction (no ambient environment lookups at runtime)
//! - Loading from YAML, TOML, or JSON files with environment variable
//!   substitution

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    BudgetConfig, CacheConfig, CircuitConfig, GatewayConfig, ModelPricing, MonitorConfig,
    PricingConfig, RateLimitConfig, UpstreamConfig,
};
