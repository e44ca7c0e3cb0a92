//! HTTP completion client.
//!
//! One POST per call; the per-call deadline is enforced by the reqwest
//! client timeout. Every failure mode is mapped into the gateway taxonomy
//! here so the rest of the gateway never handles a raw transport error:
//! 401/403 are authentication failures, 429 carries the upstream's
//! `Retry-After`, other 4xx are client errors, 5xx and connection failures
//! are severe server errors, and an elapsed deadline is a timeout.

use async_trait::async_trait;
use gateway_config::UpstreamConfig;
use gateway_core::{CompletionCall, CompletionClient, CompletionReply, GatewayError};
use http::header::RETRY_AFTER;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const UPSTREAM_NAME: &str = "completion-api";

/// Wire format of a completion request
#[derive(Debug, Serialize)]
struct CompletionRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

/// Wire format of a completion response
#[derive(Debug, Deserialize)]
struct CompletionResponseBody {
    text: String,
    usage: UsageBody,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    input_tokens: u32,
    output_tokens: u32,
}

/// Completion client over HTTP
pub struct HttpCompletionClient {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpCompletionClient {
    /// Build a client from the upstream configuration
    ///
    /// # Errors
    /// Returns `GatewayError::Configuration` if the HTTP client cannot be
    /// constructed
    pub fn new(config: UpstreamConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::configuration(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn classify_status(status: http::StatusCode, retry_after: Option<Duration>, body: String) -> GatewayError {
        match status.as_u16() {
            401 | 403 => GatewayError::upstream_auth(body),
            429 => GatewayError::UpstreamRateLimited { retry_after },
            s if status.is_client_error() => GatewayError::UpstreamClient {
                status: s,
                message: body,
            },
            s => GatewayError::upstream_server(Some(s), body),
        }
    }

    fn classify_transport(&self, error: &reqwest::Error) -> GatewayError {
        if error.is_timeout() {
            GatewayError::upstream_timeout(self.config.timeout)
        } else {
            // Connection refused, reset, DNS failure: severe but statusless
            GatewayError::upstream_server(None, error.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    fn name(&self) -> &str {
        UPSTREAM_NAME
    }

    async fn complete(&self, call: &CompletionCall) -> Result<CompletionReply, GatewayError> {
        let body = CompletionRequestBody {
            model: &call.model,
            prompt: &call.prompt,
            max_tokens: call.max_tokens,
            temperature: call.temperature,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Upstream call failed");
            return Err(Self::classify_status(status, retry_after, message));
        }

        let parsed: CompletionResponseBody = response
            .json()
            .await
            .map_err(|e| GatewayError::upstream_server(None, format!("malformed response: {e}")))?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "Upstream call completed"
        );

        Ok(CompletionReply {
            text: parsed.text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_auth_statuses_map_to_upstream_auth() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            let error = HttpCompletionClient::classify_status(status, None, "denied".into());
            assert!(matches!(error, GatewayError::UpstreamAuth { .. }));
        }
    }

    #[test]
    fn test_429_carries_retry_after() {
        let error = HttpCompletionClient::classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(7)),
            String::new(),
        );
        match error {
            GatewayError::UpstreamRateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected rate limited, got {other:?}"),
        }
    }

    #[test]
    fn test_other_4xx_is_client_error() {
        let error = HttpCompletionClient::classify_status(
            StatusCode::UNPROCESSABLE_ENTITY,
            None,
            "rejected".into(),
        );
        assert!(matches!(
            error,
            GatewayError::UpstreamClient { status: 422, .. }
        ));
        assert!(!error.is_severe());
    }

    #[test]
    fn test_5xx_is_severe() {
        let error = HttpCompletionClient::classify_status(
            StatusCode::SERVICE_UNAVAILABLE,
            None,
            "down".into(),
        );
        assert!(matches!(
            error,
            GatewayError::UpstreamServer {
                status: Some(503),
                ..
            }
        ));
        assert!(error.is_severe());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let config = UpstreamConfig {
            base_url: "https://api.upstream.example/".to_string(),
            ..UpstreamConfig::default()
        };
        let client = HttpCompletionClient::new(config).expect("client builds");
        assert_eq!(
            client.completions_url(),
            "https://api.upstream.example/v1/completions"
        );
        assert_eq!(client.name(), "completion-api");
    }
}
