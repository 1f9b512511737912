use std::future::Future;
use std::time::Duration;

use crate::domain::entitlement::EntitlementError;
use crate::ports::GatewayError;

/// Bounds a payment gateway call by `timeout` and maps its failure.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, EntitlementError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(operation, error = %e, "Payment gateway call failed");
            Err(EntitlementError::gateway(e.to_string(), e.retryable))
        }
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_secs = timeout.as_secs(),
                "Payment gateway call timed out"
            );
            Err(EntitlementError::gateway_timeout(operation, timeout.as_secs()))
        }
    }
}
