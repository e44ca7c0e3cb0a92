//! Upstream completion-client trait boundary.
//!
//! The gateway treats the AI completion service as an opaque network
//! dependency behind this trait. Implementations classify their failures
//! into the [`GatewayError`](crate::error::GatewayError) taxonomy; the
//! orchestrator never sees a raw transport error.

use crate::error::GatewayError;
use async_trait::async_trait;

/// A single completion call forwarded to the upstream service
#[derive(Debug, Clone)]
pub struct CompletionCall {
    /// Model identifier
    pub model: String,
    /// Prompt text (opaque to the gateway)
    pub prompt: String,
    /// Maximum output size
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
}

/// Generated text plus the unit counts used for billing
#[derive(Debug, Clone)]
pub struct CompletionReply {
    /// Generated text
    pub text: String,
    /// Input units consumed
    pub input_tokens: u32,
    /// Output units generated
    pub output_tokens: u32,
}

/// Trait implemented by upstream completion clients
#[async_trait]
pub trait CompletionClient: Send + Sync + 'static {
    /// Name of the upstream dependency (labels the circuit breaker and logs)
    fn name(&self) -> &str;

    /// Execute a completion call
    ///
    /// # Errors
    /// Returns a classified `GatewayError`: `UpstreamAuth`, `UpstreamClient`,
    /// `UpstreamRateLimited`, `UpstreamServer`, or `UpstreamTimeout`
    async fn complete(&self, call: &CompletionCall) -> Result<CompletionReply, GatewayError>;
}
