//! # Gateway
//!
//! The orchestrator crate: composes the cache, circuit breaker, budget
//! ledger, rate limiter, fallback selector, cost log, and performance
//! monitor into a single `execute(request) -> outcome` call.
//!
//! The contract with callers is narrow: `execute` returns either a usable
//! result (possibly pre-authored fallback content, marked as such) or a
//! structural error the caller must fix (validation, configuration,
//! upstream authentication). Raw upstream failures never escape.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod orchestrator;

pub use orchestrator::Gateway;

pub use gateway_core::{
    CompletionCall, CompletionClient, CompletionReply, GatewayError, GatewayOutcome,
    GatewayRequest, GatewayResult, ServiceType,
};
