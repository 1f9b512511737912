//! Webhook error types.
//!
//! Every failure carries its retry semantics so the receiving endpoint can
//! pick a status code that drives the gateway's redelivery correctly.

use thiserror::Error;

/// Errors that occur during webhook ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Event is older than the tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Event timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Test-mode event delivered to a live-mode deployment.
    #[error("Livemode mismatch")]
    LivemodeMismatch,

    /// Failed to parse webhook payload or signature header.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required metadata field missing from webhook event.
    #[error("Missing metadata: {0}")]
    MissingMetadata(&'static str),

    /// Event references an account this core does not know.
    #[error("Unresolved user for {0}")]
    UnresolvedUser(String),

    /// Entitlement store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Fetching the authoritative snapshot from the gateway failed.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Concurrent writers kept winning the compare-and-swap.
    #[error("Concurrent update conflict for event {0}")]
    Conflict(String),
}

impl WebhookError {
    /// Returns true if the gateway should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Storage(_) | WebhookError::Gateway(_) | WebhookError::Conflict(_)
        )
    }

    /// Returns true for attacker input or misconfiguration. Such events are
    /// never applied and need operator attention.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
                | WebhookError::LivemodeMismatch
                | WebhookError::MissingMetadata(_)
                | WebhookError::UnresolvedUser(_)
        )
    }

    /// HTTP status for a thin endpoint wrapper.
    ///
    /// 4xx stops redelivery, 5xx asks the gateway to retry.
    pub fn status_code(&self) -> u16 {
        match self {
            WebhookError::InvalidSignature | WebhookError::TimestampOutOfRange => 401,
            WebhookError::InvalidTimestamp
            | WebhookError::LivemodeMismatch
            | WebhookError::ParseError(_)
            | WebhookError::MissingMetadata(_)
            | WebhookError::UnresolvedUser(_) => 400,
            WebhookError::Storage(_) | WebhookError::Gateway(_) | WebhookError::Conflict(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_signature_displays_correctly() {
        assert_eq!(WebhookError::InvalidSignature.to_string(), "Invalid signature");
    }

    #[test]
    fn missing_metadata_displays_field_name() {
        let err = WebhookError::MissingMetadata("user_id");
        assert_eq!(err.to_string(), "Missing metadata: user_id");
    }

    #[test]
    fn signature_failures_are_integrity_violations_and_not_retried() {
        for err in [
            WebhookError::InvalidSignature,
            WebhookError::TimestampOutOfRange,
            WebhookError::UnresolvedUser("cus_1".to_string()),
        ] {
            assert!(err.is_integrity_violation(), "{:?}", err);
            assert!(!err.is_retryable(), "{:?}", err);
            assert!(err.status_code() < 500);
        }
    }

    #[test]
    fn infrastructure_failures_are_retried() {
        for err in [
            WebhookError::Storage("db down".to_string()),
            WebhookError::Gateway("timeout".to_string()),
            WebhookError::Conflict("evt_1".to_string()),
        ] {
            assert!(err.is_retryable());
            assert!(!err.is_integrity_violation());
            assert_eq!(err.status_code(), 500);
        }
    }

    #[test]
    fn parse_error_is_neither() {
        let err = WebhookError::ParseError("bad json".to_string());
        assert!(!err.is_retryable());
        assert!(!err.is_integrity_violation());
        assert_eq!(err.status_code(), 400);
    }
}
