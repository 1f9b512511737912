//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port against the Stripe REST API.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::PaymentConfig;
use crate::domain::billing::{GatewayEvent, SignatureVerifier, SubscriptionSnapshot, WebhookError};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CancellationMode, CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError,
    GatewayErrorCode, PaymentGateway, SubscriptionInfo,
};

use super::wire_types::{StripeCustomer, StripeErrorBody, StripeSubscription, StripeWebhookEvent};

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Base URL including the version segment.
    api_base_url: String,

    /// Whether to reject test-mode events.
    require_livemode: bool,

    webhook_tolerance_secs: i64,

    /// Per-request HTTP timeout.
    request_timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            api_base_url: "https://api.stripe.com/v1".to_string(),
            require_livemode: false,
            webhook_tolerance_secs: crate::domain::billing::DEFAULT_TOLERANCE_SECS,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_payment_config(config: &PaymentConfig) -> Self {
        Self {
            api_key: config.api_key(),
            webhook_secret: config.webhook_secret(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            require_livemode: config.require_livemode,
            webhook_tolerance_secs: config.webhook_tolerance_secs,
            request_timeout: config.gateway_timeout(),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("api_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("require_livemode", &self.require_livemode)
            .finish()
    }
}

/// Stripe payment gateway.
pub struct StripeGateway {
    config: StripeConfig,
    verifier: SignatureVerifier,
    http_client: reqwest::Client,
}

impl StripeGateway {
    /// Builds the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the HTTP client cannot be constructed.
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::provider(format!("Failed to build HTTP client: {}", e)))?;
        let verifier = SignatureVerifier::new(config.webhook_secret.clone())
            .with_tolerance(config.webhook_tolerance_secs);
        Ok(Self {
            config,
            verifier,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url, path)
    }

    fn post(&self, path: &str, idempotency_key: Option<&str>) -> reqwest::RequestBuilder {
        let builder = self
            .http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);
        match idempotency_key {
            Some(key) => builder.header("Idempotency-Key", key),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    /// Sets `cancel_at_period_end` on a subscription.
    async fn set_cancel_at_period_end(
        &self,
        subscription_id: &str,
        cancel: bool,
        operation: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let response = self
            .post(&format!("subscriptions/{}", subscription_id), None)
            .form(&[("cancel_at_period_end", cancel.to_string())])
            .send()
            .await
            .map_err(network_error)?;

        let subscription: StripeSubscription = Self::read(response, operation).await?;
        subscription
            .into_snapshot()
            .map_err(|e| GatewayError::provider(e.to_string()))
    }

    /// Decodes a successful body or maps the Stripe error body.
    async fn read<T: DeserializeOwned>(
        response: reqwest::Response,
        operation: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.map_err(|e| {
                GatewayError::provider(format!("Failed to parse Stripe response: {}", e))
            });
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(operation, status = status.as_u16(), error = %body, "Stripe call failed");
        Err(map_error(status, &body))
    }
}

fn network_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::network(format!("Stripe request timed out: {}", err))
    } else {
        GatewayError::network(err.to_string())
    }
}

/// Maps an HTTP status and Stripe error body to a gateway error.
fn map_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    let detail = serde_json::from_str::<StripeErrorBody>(body).ok().map(|b| b.error);
    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| format!("Stripe API error ({})", status));

    let code = match status.as_u16() {
        400 => GatewayErrorCode::InvalidRequest,
        401 | 403 => GatewayErrorCode::AuthenticationError,
        402 => GatewayErrorCode::CardDeclined,
        404 => GatewayErrorCode::NotFound,
        429 => GatewayErrorCode::RateLimitExceeded,
        _ => GatewayErrorCode::ProviderError,
    };

    let error = GatewayError::new(code, message);
    match detail.and_then(|d| d.code.or(d.error_type)) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        let params = vec![
            ("email", request.email.clone()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let response = self
            .post("customers", request.idempotency_key.as_deref())
            .form(&params)
            .send()
            .await
            .map_err(network_error)?;

        let customer: StripeCustomer = Self::read(response, "create_customer").await?;
        tracing::info!(customer_id = %customer.id, user_id = %request.user_id, "Stripe customer created");

        Ok(Customer {
            id: customer.id,
            email: customer.email.unwrap_or(request.email),
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let mut params = vec![
            ("customer".to_string(), request.customer_id.clone()),
            ("items[0][price]".to_string(), request.price_id.clone()),
        ];
        if let Some(days) = request.trial_days {
            params.push(("trial_period_days".to_string(), days.to_string()));
        }
        if let Some(payment_method) = &request.payment_method_id {
            params.push(("default_payment_method".to_string(), payment_method.clone()));
        }
        for (key, value) in &request.metadata {
            params.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .post("subscriptions", request.idempotency_key.as_deref())
            .form(&params)
            .send()
            .await
            .map_err(network_error)?;

        let subscription: StripeSubscription = Self::read(response, "create_subscription").await?;
        subscription
            .into_snapshot()
            .map_err(|e| GatewayError::provider(e.to_string()))
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        let response = self
            .get(&format!("subscriptions/{}", subscription_id))
            .send()
            .await
            .map_err(network_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let subscription: StripeSubscription = Self::read(response, "get_subscription").await?;
        subscription
            .into_snapshot()
            .map(Some)
            .map_err(|e| GatewayError::provider(e.to_string()))
    }

    async fn get_subscription_info(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionInfo>, GatewayError> {
        let response = self
            .get(&format!("subscriptions/{}", subscription_id))
            .query(&[("expand[]", "items.data.price")])
            .send()
            .await
            .map_err(network_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let subscription: StripeSubscription =
            Self::read(response, "get_subscription_info").await?;
        subscription
            .into_info()
            .map(Some)
            .map_err(|e| GatewayError::provider(e.to_string()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        mode: CancellationMode,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let snapshot = match mode {
            CancellationMode::Immediately => {
                let response = self
                    .http_client
                    .delete(self.url(&format!("subscriptions/{}", subscription_id)))
                    .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
                    .send()
                    .await
                    .map_err(network_error)?;
                let subscription: StripeSubscription =
                    Self::read(response, "cancel_subscription").await?;
                subscription
                    .into_snapshot()
                    .map_err(|e| GatewayError::provider(e.to_string()))?
            }
            CancellationMode::AtPeriodEnd => {
                self.set_cancel_at_period_end(subscription_id, true, "cancel_subscription")
                    .await?
            }
        };

        tracing::info!(subscription_id, ?mode, "Stripe subscription canceled");
        Ok(snapshot)
    }

    async fn reactivate_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let snapshot = self
            .set_cancel_at_period_end(subscription_id, false, "reactivate_subscription")
            .await?;
        tracing::info!(subscription_id, "Stripe subscription reactivated");
        Ok(snapshot)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        if let Err(e) = self
            .verifier
            .verify(payload, signature, Timestamp::now().as_unix_secs())
        {
            tracing::warn!(error = %e, "Webhook signature rejected");
            return Err(e);
        }

        let stripe_event = StripeWebhookEvent::from_slice(payload)?;
        if self.config.require_livemode && !stripe_event.livemode {
            tracing::warn!(event_id = %stripe_event.id, "Rejected test mode event in production");
            return Err(WebhookError::LivemodeMismatch);
        }

        let event = stripe_event.into_gateway_event()?;
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Webhook signature verified");
        Ok(event)
    }
}
