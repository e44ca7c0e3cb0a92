//! Error types and handling for the gateway.
//!
//! The taxonomy separates failures the caller must see (validation,
//! configuration, upstream authentication) from failures the orchestrator
//! absorbs into a fallback response. Classification drives three behaviors:
//! whether an error is retried, whether it counts toward the circuit
//! breaker, and which HTTP status it maps to at an outer surface.

use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Comprehensive gateway error type covering all failure scenarios
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Invalid configuration; fails startup, never a per-request error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Caller's request is malformed
    #[error("Validation error: {message}")]
    Validation {
        /// Error message
        message: String,
        /// Field that failed validation (if applicable)
        field: Option<String>,
    },

    /// Upstream rejected our credentials; fatal for the deployment
    #[error("Upstream authentication failed: {message}")]
    UpstreamAuth {
        /// Error message
        message: String,
    },

    /// Upstream rejected the request as a client error (4xx other than
    /// 401/403/429); not retried, not circuit-relevant
    #[error("Upstream client error ({status}): {message}")]
    UpstreamClient {
        /// HTTP status code returned by the upstream
        status: u16,
        /// Error message
        message: String,
    },

    /// Upstream throttled us (429); retried with backoff, does not count
    /// toward the circuit breaker
    #[error("Upstream rate limited")]
    UpstreamRateLimited {
        /// Duration to wait before retrying, if the upstream reported one
        retry_after: Option<Duration>,
    },

    /// Upstream server error (5xx or connection failure); severe
    #[error("Upstream server error: {message}")]
    UpstreamServer {
        /// HTTP status code, if the failure produced one
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Upstream call exceeded its deadline; severe, billed at zero
    #[error("Upstream timeout after {duration:?}")]
    UpstreamTimeout {
        /// Duration after which the call was abandoned
        duration: Duration,
    },

    /// Daily budget is exhausted; fails fast, no upstream call attempted
    #[error("Daily budget exceeded: spent {spent:.2} of {limit:.2}")]
    BudgetExceeded {
        /// Amount spent so far today
        spent: f64,
        /// Configured daily limit
        limit: f64,
    },

    /// Circuit breaker is open; fails fast, no upstream call attempted
    #[error("Circuit open for upstream: {upstream}")]
    CircuitOpen {
        /// Name of the upstream dependency with the open circuit
        upstream: String,
        /// Time remaining until the next probe is permitted
        retry_after: Option<Duration>,
    },

    /// Gateway-side admission control rejected the request
    #[error("Rate limit exceeded for caller: {caller}")]
    RateLimited {
        /// Caller key that exceeded its limit
        caller: String,
        /// Duration until the window resets
        retry_after: Duration,
    },

    /// Shared state store operation failed
    #[error("State store error: {message}")]
    Store {
        /// Error message
        message: String,
    },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::UpstreamAuth { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } | Self::UpstreamRateLimited { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Self::UpstreamClient { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::UpstreamServer { .. } => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::BudgetExceeded { .. } | Self::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Configuration { .. } | Self::Store { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this failure counts toward the circuit breaker.
    ///
    /// Only genuine upstream unavailability is severe: 5xx, timeouts, and
    /// connection failures. A 429 reflects the gateway's own over-admission
    /// and a 4xx reflects a bad request, so neither opens the circuit.
    #[must_use]
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            Self::UpstreamServer { .. } | Self::UpstreamTimeout { .. }
        )
    }

    /// Check if this error is worth retrying with backoff
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamServer { .. }
                | Self::UpstreamTimeout { .. }
                | Self::UpstreamRateLimited { .. }
        )
    }

    /// Whether the orchestrator surfaces this error to the caller instead of
    /// converting it into a fallback response
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Configuration { .. } | Self::UpstreamAuth { .. }
        )
    }

    /// Short stable class name, recorded in the cost log
    #[must_use]
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Validation { .. } => "validation",
            Self::UpstreamAuth { .. } => "upstream_auth",
            Self::UpstreamClient { .. } => "upstream_client",
            Self::UpstreamRateLimited { .. } => "upstream_rate_limited",
            Self::UpstreamServer { .. } => "upstream_server",
            Self::UpstreamTimeout { .. } => "upstream_timeout",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RateLimited { .. } => "rate_limited",
            Self::Store { .. } => "store",
            Self::Internal { .. } => "internal",
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    #[must_use]
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    /// Create an upstream authentication error
    #[must_use]
    pub fn upstream_auth(message: impl Into<String>) -> Self {
        Self::UpstreamAuth {
            message: message.into(),
        }
    }

    /// Create an upstream server error
    #[must_use]
    pub fn upstream_server(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::UpstreamServer {
            status,
            message: message.into(),
        }
    }

    /// Create an upstream timeout error
    #[must_use]
    pub fn upstream_timeout(duration: Duration) -> Self {
        Self::UpstreamTimeout { duration }
    }

    /// Create a state store error
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::validation("bad", None).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::upstream_auth("denied").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::upstream_timeout(Duration::from_secs(30)).status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::BudgetExceeded {
                spent: 100.0,
                limit: 100.0
            }
            .status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_severity_classification() {
        // Only 5xx and timeouts open the circuit
        assert!(GatewayError::upstream_server(Some(503), "down").is_severe());
        assert!(GatewayError::upstream_server(None, "connection reset").is_severe());
        assert!(GatewayError::upstream_timeout(Duration::from_secs(30)).is_severe());

        assert!(!GatewayError::UpstreamRateLimited { retry_after: None }.is_severe());
        assert!(!GatewayError::UpstreamClient {
            status: 400,
            message: "bad prompt".into()
        }
        .is_severe());
        assert!(!GatewayError::validation("bad", None).is_severe());
    }

    #[test]
    fn test_retryability() {
        assert!(GatewayError::upstream_server(Some(500), "err").is_retryable());
        assert!(GatewayError::upstream_timeout(Duration::from_secs(1)).is_retryable());
        assert!(GatewayError::UpstreamRateLimited { retry_after: None }.is_retryable());

        assert!(!GatewayError::upstream_auth("denied").is_retryable());
        assert!(!GatewayError::UpstreamClient {
            status: 422,
            message: "rejected".into()
        }
        .is_retryable());
        assert!(!GatewayError::BudgetExceeded {
            spent: 1.0,
            limit: 1.0
        }
        .is_retryable());
    }

    #[test]
    fn test_structural_errors() {
        assert!(GatewayError::validation("bad", None).is_structural());
        assert!(GatewayError::configuration("bad").is_structural());
        assert!(GatewayError::upstream_auth("denied").is_structural());

        assert!(!GatewayError::upstream_server(Some(500), "err").is_structural());
        assert!(!GatewayError::CircuitOpen {
            upstream: "completion".into(),
            retry_after: None
        }
        .is_structural());
    }

    #[test]
    fn test_error_class_stability() {
        assert_eq!(
            GatewayError::upstream_timeout(Duration::from_secs(1)).error_class(),
            "upstream_timeout"
        );
        assert_eq!(
            GatewayError::validation("bad", None).error_class(),
            "validation"
        );
    }
}
