//! Deadline enforcement for upstream calls.

use gateway_core::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run `future` with a hard deadline, mapping elapse to `UpstreamTimeout`.
///
/// # Errors
/// Returns `GatewayError::UpstreamTimeout` when the deadline elapses, or
/// the future's own error
pub async fn with_deadline<T, F>(future: F, deadline: Duration) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis(), "Upstream call timed out");
            Err(GatewayError::upstream_timeout(deadline))
        }
    }
}
