//! Payment gateway port.
//!
//! The gateway owns money movement and is the source of truth for paid
//! subscriptions. This core creates customers and subscriptions, cancels
//! and reactivates them, fetches subscription state, and verifies webhooks.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::billing::{GatewayEvent, SubscriptionSnapshot, WebhookError};
use crate::domain::entitlement::SubscriptionStatus;
use crate::domain::foundation::{Timestamp, UserId};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer in the payment system.
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError>;

    /// Create a subscription for a customer.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Fetch the authoritative state of a subscription.
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError>;

    /// Fetch a subscription together with its price, for display.
    async fn get_subscription_info(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionInfo>, GatewayError>;

    /// End a subscription now, or stop it renewing after the current period.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        mode: CancellationMode,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Withdraw a scheduled end-of-period cancellation.
    async fn reactivate_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Verify a webhook signature and decode the event.
    fn verify_webhook(&self, payload: &[u8], signature: &str)
        -> Result<GatewayEvent, WebhookError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCustomerRequest {
    /// Stored as `metadata.user_id` on the customer.
    pub user_id: UserId,
    pub email: String,
    /// Idempotency key for safe retries.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub price_id: String,
    /// Gateway-side trial length; `None` bills immediately.
    pub trial_days: Option<u32>,
    pub payment_method_id: Option<String>,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationMode {
    Immediately,
    AtPeriodEnd,
}

/// Subscription details as shown to the subscriber.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionInfo {
    pub id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    pub price_id: Option<String>,
    /// Unit amount in the smallest currency unit.
    pub amount_cents: i64,
    pub currency: Option<String>,
    /// Billing interval (`month`, `year`).
    pub interval: String,
}

/// Payment gateway error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// Gateway's own error code, if it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationError, message)
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::CardDeclined, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(GatewayErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    NetworkError,
    AuthenticationError,
    CardDeclined,
    InvalidRequest,
    NotFound,
    RateLimitExceeded,
    ProviderError,
}

impl GatewayErrorCode {
    /// Check if this error type is typically retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::NetworkError
                | GatewayErrorCode::RateLimitExceeded
                | GatewayErrorCode::ProviderError
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::CardDeclined => "card_declined",
            GatewayErrorCode::InvalidRequest => "invalid_request",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
