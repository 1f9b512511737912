//! Mock payment gateway for testing.
//!
//! Supports:
//! - Pre-configured subscriptions
//! - Error injection, per method or for the next call
//! - Artificial latency for timeout tests
//! - Call tracking
//! - Real signature checks, or accepting every webhook

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::domain::billing::{
    GatewayEvent, SignatureVerifier, SubscriptionSnapshot, WebhookError,
};
use crate::domain::entitlement::SubscriptionStatus;
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CancellationMode, CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError,
    PaymentGateway, SubscriptionInfo,
};

use super::wire_types::StripeWebhookEvent;

/// Mock payment gateway.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentGateway::new();
/// mock.set_method_error("create_subscription", GatewayError::card_declined("Test decline"));
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Subscriptions by ID, as returned by `get_subscription`.
    subscriptions: HashMap<String, SubscriptionSnapshot>,

    /// Price ID per subscription, from `create_subscription`.
    prices: HashMap<String, String>,

    /// Status returned by `create_subscription`.
    created_status: Option<SubscriptionStatus>,

    next_error: Option<GatewayError>,

    method_errors: HashMap<String, GatewayError>,

    /// Sleep before answering.
    delay: Option<Duration>,

    call_log: Vec<MethodCall>,

    customer_seq: u32,
    subscription_seq: u32,

    webhook_verifier: Option<SignatureVerifier>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose `verify_webhook` checks signatures with `secret`.
    pub fn with_webhook_secret(secret: &str) -> Self {
        let mock = Self::new();
        mock.state().webhook_verifier =
            Some(SignatureVerifier::new(SecretString::new(secret.to_string())));
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the "gateway".
    pub fn add_subscription(&self, subscription: SubscriptionSnapshot) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Status given to subscriptions created from now on (default `trialing`).
    pub fn set_created_status(&self, status: SubscriptionStatus) {
        self.state().created_status = Some(status);
    }

    /// Error returned by the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    /// Delay every async call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), GatewayError> {
        let delay = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            if let Some(error) = state.method_errors.get(method) {
                return Err(error.clone());
            }
            if let Some(error) = state.next_error.take() {
                return Err(error);
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, GatewayError> {
        self.enter(
            "create_customer",
            vec![
                request.user_id.to_string(),
                request.email.clone(),
                request.idempotency_key.clone().unwrap_or_default(),
            ],
        )
        .await?;

        let mut state = self.state();
        state.customer_seq += 1;
        Ok(Customer {
            id: format!("cus_mock_{}", state.customer_seq),
            email: request.email,
        })
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.enter(
            "create_subscription",
            vec![
                request.customer_id.clone(),
                request.price_id.clone(),
                request.idempotency_key.clone().unwrap_or_default(),
            ],
        )
        .await?;

        let mut state = self.state();
        state.subscription_seq += 1;
        let status = state.created_status.unwrap_or(SubscriptionStatus::Trialing);
        let period_days = i64::from(request.trial_days.unwrap_or(30));
        let subscription = SubscriptionSnapshot {
            id: format!("sub_mock_{}", state.subscription_seq),
            customer_id: request.customer_id,
            status,
            current_period_end: Some(Timestamp::now().add_days(period_days)),
            cancel_at_period_end: false,
            user_id: request.metadata.get("user_id").cloned(),
        };
        state
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        state
            .prices
            .insert(subscription.id.clone(), request.price_id);
        Ok(subscription)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        self.enter("get_subscription", vec![subscription_id.to_string()])
            .await?;
        Ok(self.state().subscriptions.get(subscription_id).cloned())
    }

    async fn get_subscription_info(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionInfo>, GatewayError> {
        self.enter("get_subscription_info", vec![subscription_id.to_string()])
            .await?;
        let state = self.state();
        Ok(state.subscriptions.get(subscription_id).map(|sub| SubscriptionInfo {
            id: sub.id.clone(),
            status: sub.status,
            current_period_start: sub.current_period_end.map(|end| end.add_days(-30)),
            current_period_end: sub.current_period_end,
            cancel_at_period_end: sub.cancel_at_period_end,
            price_id: state.prices.get(subscription_id).cloned(),
            amount_cents: 999,
            currency: Some("usd".to_string()),
            interval: "month".to_string(),
        }))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &str,
        mode: CancellationMode,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.enter(
            "cancel_subscription",
            vec![subscription_id.to_string(), format!("{:?}", mode)],
        )
        .await?;

        let mut state = self.state();
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;
        match mode {
            CancellationMode::Immediately => {
                sub.status = SubscriptionStatus::Canceled;
                sub.cancel_at_period_end = false;
            }
            CancellationMode::AtPeriodEnd => sub.cancel_at_period_end = true,
        }
        Ok(sub.clone())
    }

    async fn reactivate_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.enter("reactivate_subscription", vec![subscription_id.to_string()])
            .await?;

        let mut state = self.state();
        let sub = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;
        sub.cancel_at_period_end = false;
        Ok(sub.clone())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<GatewayEvent, WebhookError> {
        let verifier = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: "verify_webhook".to_string(),
                args: vec![signature.to_string()],
            });
            state.webhook_verifier.clone()
        };
        if let Some(verifier) = verifier {
            verifier.verify(payload, signature, Timestamp::now().as_unix_secs())?;
        }
        StripeWebhookEvent::from_slice(payload)?.into_gateway_event()
    }
}
