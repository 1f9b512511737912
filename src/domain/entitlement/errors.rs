//! Entitlement-specific error types.
//!
//! Only infrastructure faults live here. Business outcomes such as an
//! ineligible user are [`super::TrialRejection`] values.

use crate::domain::foundation::{DomainError, ErrorCode, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    /// The store has no record for this user.
    NotFound(UserId),

    /// Concurrent writers kept winning the compare-and-swap.
    Conflict(UserId),

    /// Payment gateway rejected or failed the call.
    Gateway { message: String, retryable: bool },

    /// Payment gateway did not answer in time.
    GatewayTimeout { operation: String, after_secs: u64 },

    ValidationFailed { field: String, message: String },

    /// Store unavailable or returned an error.
    Infrastructure(String),
}

impl EntitlementError {
    pub fn not_found(user_id: UserId) -> Self {
        EntitlementError::NotFound(user_id)
    }

    pub fn conflict(user_id: UserId) -> Self {
        EntitlementError::Conflict(user_id)
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        EntitlementError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn gateway_timeout(operation: impl Into<String>, after_secs: u64) -> Self {
        EntitlementError::GatewayTimeout {
            operation: operation.into(),
            after_secs,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EntitlementError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        EntitlementError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EntitlementError::NotFound(_) => ErrorCode::EntitlementNotFound,
            EntitlementError::Conflict(_) => ErrorCode::VersionConflict,
            EntitlementError::Gateway { .. } => ErrorCode::GatewayError,
            EntitlementError::GatewayTimeout { .. } => ErrorCode::GatewayTimeout,
            EntitlementError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            EntitlementError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            EntitlementError::NotFound(user_id) => {
                format!("No entitlement found for user: {}", user_id)
            }
            EntitlementError::Conflict(user_id) => {
                format!("Concurrent updates to entitlement of user {}; retry", user_id)
            }
            EntitlementError::Gateway { message, .. } => format!("Payment gateway error: {}", message),
            EntitlementError::GatewayTimeout {
                operation,
                after_secs,
            } => format!(
                "Payment gateway timed out during {} after {}s",
                operation, after_secs
            ),
            EntitlementError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            EntitlementError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            EntitlementError::Conflict(_)
            | EntitlementError::GatewayTimeout { .. }
            | EntitlementError::Infrastructure(_) => true,
            EntitlementError::Gateway { retryable, .. } => *retryable,
            EntitlementError::NotFound(_) | EntitlementError::ValidationFailed { .. } => false,
        }
    }
}

impl std::fmt::Display for EntitlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for EntitlementError {}

impl From<DomainError> for EntitlementError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => EntitlementError::ValidationFailed {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            _ => EntitlementError::Infrastructure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn not_found_is_not_retryable() {
        let err = EntitlementError::not_found(user());
        assert_eq!(err.code(), ErrorCode::EntitlementNotFound);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("user-1"));
    }

    #[test]
    fn timeouts_and_conflicts_are_retryable() {
        assert!(EntitlementError::gateway_timeout("create_subscription", 10).is_retryable());
        assert!(EntitlementError::conflict(user()).is_retryable());
        assert!(EntitlementError::infrastructure("db down").is_retryable());
    }

    #[test]
    fn gateway_retryability_follows_gateway() {
        assert!(EntitlementError::gateway("rate limited", true).is_retryable());
        assert!(!EntitlementError::gateway("card declined", false).is_retryable());
    }

    #[test]
    fn domain_database_error_maps_to_infrastructure() {
        let err: EntitlementError = DomainError::database("connection refused").into();
        assert_eq!(err.code(), ErrorCode::DatabaseError);
    }

    #[test]
    fn domain_validation_error_keeps_field() {
        let err: EntitlementError = DomainError::validation("email", "bad").into();
        assert_eq!(
            err,
            EntitlementError::ValidationFailed {
                field: "email".to_string(),
                message: "bad".to_string()
            }
        );
    }
}
