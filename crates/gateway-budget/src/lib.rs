//! # Gateway Budget
//!
//! Daily spend accounting for a metered upstream. The ledger keeps the
//! authoritative spent total in the shared state store so every gateway
//! instance reserves against the same number, and fires each configured
//! alert threshold exactly once per budget day.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ledger;
pub mod pricing;

pub use ledger::{
    AlertSeverity, BudgetAlert, BudgetDecision, BudgetLedger, BudgetReservation, BudgetStatus,
    LedgerConfig,
};
pub use pricing::{PricingModel, TokenRates};
