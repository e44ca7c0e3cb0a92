//! Request and outcome types exchanged with calling application services.
//!
//! The gateway treats the request payload as opaque text to forward
//! upstream; only the service type, fingerprint, and attribution metadata
//! carry meaning here. Requests are built through a validating builder so
//! the only caller-facing hard failure is a `Validation` error.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Service type identifying the calling application feature.
///
/// Open-ended string newtype: cache TTLs and fallback templates are keyed by
/// service type, and unknown types simply get the generic treatment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceType(String);

impl ServiceType {
    /// Structured funding-match explanation service
    pub const EXPLANATION: &'static str = "explanation";
    /// Free-form conversational Q&A service
    pub const QA: &'static str = "qa";

    /// Create a service type
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the service type name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A request submitted to the gateway by an application service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Service type for TTL and fallback selection
    pub service_type: ServiceType,
    /// Deterministic cache key supplied by the caller
    pub fingerprint: String,
    /// Opaque prompt text forwarded to the upstream model
    pub payload: String,
    /// Requested output size cap
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Caller identity, used for rate limiting and cost attribution
    pub caller_id: String,
    /// Organization the caller belongs to, for cost attribution only
    pub org_id: String,
    /// Structured fields available to fallback templates
    /// (e.g. program name, organization name, score)
    #[serde(default)]
    pub template_fields: Vec<(String, String)>,
}

impl GatewayRequest {
    /// Create a builder for a gateway request
    #[must_use]
    pub fn builder() -> GatewayRequestBuilder {
        GatewayRequestBuilder::default()
    }

    /// Check the builder's invariants.
    ///
    /// Fields are public, so requests can also arrive as struct literals
    /// or deserialized payloads; the gateway re-runs this check on every
    /// execution.
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` for missing or out-of-range fields
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.service_type.as_str().trim().is_empty() {
            return Err(GatewayError::validation(
                "service_type is required",
                Some("service_type".into()),
            ));
        }
        if self.fingerprint.trim().is_empty() {
            return Err(GatewayError::validation(
                "fingerprint must be a non-empty string",
                Some("fingerprint".into()),
            ));
        }
        if self.payload.trim().is_empty() {
            return Err(GatewayError::validation(
                "payload must be a non-empty string",
                Some("payload".into()),
            ));
        }
        if self.max_tokens == 0 {
            return Err(GatewayError::validation(
                "max_tokens must be at least 1",
                Some("max_tokens".into()),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GatewayError::validation(
                format!("temperature {} out of range [0.0, 2.0]", self.temperature),
                Some("temperature".into()),
            ));
        }
        if self.caller_id.is_empty() {
            return Err(GatewayError::validation(
                "caller_id is required",
                Some("caller_id".into()),
            ));
        }
        Ok(())
    }
}

/// Builder for [`GatewayRequest`] with validation on `build()`
#[derive(Debug, Default)]
pub struct GatewayRequestBuilder {
    service_type: Option<ServiceType>,
    fingerprint: Option<String>,
    payload: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    caller_id: Option<String>,
    org_id: Option<String>,
    template_fields: Vec<(String, String)>,
}

impl GatewayRequestBuilder {
    /// Set the service type
    #[must_use]
    pub fn service_type(mut self, service_type: impl Into<ServiceType>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    /// Set the fingerprint
    #[must_use]
    pub fn fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Set the payload
    #[must_use]
    pub fn payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Set the max output tokens
    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature
    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the caller ID
    #[must_use]
    pub fn caller_id(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// Set the organization ID
    #[must_use]
    pub fn org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Add a structured field for fallback templates
    #[must_use]
    pub fn template_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template_fields.push((key.into(), value.into()));
        self
    }

    /// Build and validate the request
    ///
    /// # Errors
    /// Returns `GatewayError::Validation` for missing or out-of-range fields
    pub fn build(self) -> Result<GatewayRequest, GatewayError> {
        let request = GatewayRequest {
            service_type: self.service_type.unwrap_or_else(|| ServiceType::new("")),
            fingerprint: self.fingerprint.unwrap_or_default(),
            payload: self.payload.unwrap_or_default(),
            max_tokens: self.max_tokens.unwrap_or(1024),
            temperature: self.temperature.unwrap_or(0.7),
            caller_id: self.caller_id.unwrap_or_default(),
            org_id: self.org_id.unwrap_or_default(),
            template_fields: self.template_fields,
        };
        request.validate()?;
        Ok(request)
    }
}

/// The result of a gateway call, always usable by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayOutcome {
    /// Generated (or fallback) content
    pub content: String,
    /// Whether the response came from the cache
    pub cached: bool,
    /// Whether pre-authored fallback content was substituted
    pub fallback_used: bool,
    /// Fallback category when `fallback_used` is true
    pub fallback_category: Option<String>,
    /// Cost billed for this call (0 for cache hits and fallbacks)
    pub cost: f64,
    /// Input tokens reported by the upstream
    pub input_tokens: u32,
    /// Output tokens reported by the upstream
    pub output_tokens: u32,
    /// End-to-end gateway latency
    pub duration: Duration,
}

impl GatewayOutcome {
    /// Total tokens used (input + output)
    #[must_use]
    pub fn tokens_used(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}
