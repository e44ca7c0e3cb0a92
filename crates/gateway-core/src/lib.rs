//! # Gateway Core
//!
//! Core domain types for the resilience gateway:
//! - Request/outcome types exchanged with calling application services
//! - The complete gateway error taxonomy with severity classification
//! - The upstream completion-client trait boundary

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod types;
pub mod upstream;

// Re-export main types
pub use error::{GatewayError, GatewayResult};
pub use types::{GatewayOutcome, GatewayRequest, GatewayRequestBuilder, ServiceType};
pub use upstream::{CompletionCall, CompletionClient, CompletionReply};
