//! Stripe JSON objects and their mapping onto gateway events.
//!
//! Only the fields this service reads are modelled; everything else in
//! the payload is ignored by serde.

use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::billing::{
    CheckoutSummary, GatewayEvent, GatewayEventKind, InvoiceSummary, SubscriptionSnapshot,
    WebhookError,
};
use crate::domain::entitlement::SubscriptionStatus;
use crate::domain::foundation::Timestamp;
use crate::ports::SubscriptionInfo;

// ════════════════════════════════════════════════════════════════════════════════
// Event envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Raw Stripe webhook event as received from the API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    /// Unique event identifier (evt_...).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix timestamp when the event was created.
    #[serde(default)]
    pub created: Option<i64>,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    /// The object affected by this event.
    pub object: serde_json::Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe objects
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCustomer {
    /// Unique customer identifier (cus_...).
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    /// Unique subscription identifier (sub_...).
    pub id: String,

    /// Customer ID owning this subscription.
    pub customer: String,

    pub status: String,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    /// Current period end (Unix timestamp).
    #[serde(default)]
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Present with its prices when fetched with `expand[]=items.data.price`.
    #[serde(default)]
    pub items: Option<StripeList<StripeSubscriptionItem>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct StripeList<T> {
    #[serde(default)]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscriptionItem {
    pub price: StripePrice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePrice {
    /// Price identifier (price_...).
    pub id: String,

    #[serde(default)]
    pub unit_amount: Option<i64>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub recurring: Option<StripeRecurring>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeRecurring {
    pub interval: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeInvoice {
    /// Unique invoice identifier (in_...).
    pub id: String,

    pub customer: String,

    pub subscription: Option<String>,

    /// Amount paid in cents.
    #[serde(default)]
    pub amount_paid: i64,

    /// Amount due in cents.
    #[serde(default)]
    pub amount_due: i64,

    /// Currency (lowercase).
    pub currency: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    /// Unique session identifier (cs_...).
    pub id: String,

    /// Payment mode (payment, setup, subscription).
    pub mode: String,

    pub customer: Option<String>,

    pub subscription: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Error body returned by the Stripe API.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorBody {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Mapping
// ════════════════════════════════════════════════════════════════════════════════

impl StripeSubscription {
    /// Converts to a snapshot; an unrecognised status is a parse error.
    pub fn into_snapshot(self) -> Result<SubscriptionSnapshot, WebhookError> {
        let status = SubscriptionStatus::from_gateway(&self.status).ok_or_else(|| {
            WebhookError::ParseError(format!("unknown subscription status '{}'", self.status))
        })?;
        Ok(SubscriptionSnapshot {
            id: self.id,
            customer_id: self.customer,
            status,
            current_period_end: self.current_period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: self.cancel_at_period_end,
            user_id: self.metadata.get("user_id").cloned(),
        })
    }

    /// Display view; prices come from the first subscription item.
    pub fn into_info(self) -> Result<SubscriptionInfo, WebhookError> {
        let status = SubscriptionStatus::from_gateway(&self.status).ok_or_else(|| {
            WebhookError::ParseError(format!("unknown subscription status '{}'", self.status))
        })?;
        let price = self
            .items
            .and_then(|items| items.data.into_iter().next())
            .map(|item| item.price);
        Ok(SubscriptionInfo {
            id: self.id,
            status,
            current_period_start: self.current_period_start.and_then(Timestamp::from_unix_secs),
            current_period_end: self.current_period_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: self.cancel_at_period_end,
            amount_cents: price.as_ref().and_then(|p| p.unit_amount).unwrap_or(0),
            currency: price.as_ref().and_then(|p| p.currency.clone()),
            interval: price
                .as_ref()
                .and_then(|p| p.recurring.as_ref())
                .map(|r| r.interval.clone())
                .unwrap_or_else(|| "month".to_string()),
            price_id: price.map(|p| p.id),
        })
    }
}

impl StripeInvoice {
    fn into_summary(self, paid: bool) -> InvoiceSummary {
        InvoiceSummary {
            amount_cents: if paid { self.amount_paid } else { self.amount_due },
            user_id: self.metadata.get("user_id").cloned(),
            id: self.id,
            customer_id: self.customer,
            subscription_id: self.subscription,
            currency: self.currency,
        }
    }
}

impl StripeCheckoutSession {
    fn into_summary(self) -> CheckoutSummary {
        CheckoutSummary {
            user_id: self.metadata.get("user_id").cloned(),
            session_id: self.id,
            mode: self.mode,
            customer_id: self.customer,
            subscription_id: self.subscription,
        }
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(
    object: serde_json::Value,
    what: &str,
) -> Result<T, WebhookError> {
    serde_json::from_value(object)
        .map_err(|e| WebhookError::ParseError(format!("Invalid {}: {}", what, e)))
}

impl StripeWebhookEvent {
    /// Decodes a raw payload into the envelope.
    pub fn from_slice(payload: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(payload)
            .map_err(|e| WebhookError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Maps the envelope and its object onto a typed gateway event.
    pub fn into_gateway_event(self) -> Result<GatewayEvent, WebhookError> {
        let object = self.data.object;
        let kind = match self.event_type.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => {
                let sub: StripeSubscription = decode_object(object, "subscription")?;
                GatewayEventKind::SubscriptionChanged(sub.into_snapshot()?)
            }
            "customer.subscription.deleted" => {
                let sub: StripeSubscription = decode_object(object, "subscription")?;
                GatewayEventKind::SubscriptionDeleted(sub.into_snapshot()?)
            }
            "invoice.payment_succeeded" | "invoice.paid" => {
                let invoice: StripeInvoice = decode_object(object, "invoice")?;
                GatewayEventKind::InvoicePaid(invoice.into_summary(true))
            }
            "invoice.payment_failed" => {
                let invoice: StripeInvoice = decode_object(object, "invoice")?;
                GatewayEventKind::InvoicePaymentFailed(invoice.into_summary(false))
            }
            "checkout.session.completed" => {
                let session: StripeCheckoutSession = decode_object(object, "checkout session")?;
                GatewayEventKind::CheckoutCompleted(session.into_summary())
            }
            _ => GatewayEventKind::Unknown,
        };

        Ok(GatewayEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created.and_then(Timestamp::from_unix_secs),
            livemode: self.livemode,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(payload: &str) -> Result<GatewayEvent, WebhookError> {
        StripeWebhookEvent::from_slice(payload.as_bytes())?.into_gateway_event()
    }

    #[test]
    fn subscription_updated_maps_status_and_metadata() {
        let event = decode(
            r#"{
                "id": "evt_sub",
                "type": "customer.subscription.updated",
                "created": 1704067200,
                "data": {
                    "object": {
                        "id": "sub_test",
                        "object": "subscription",
                        "customer": "cus_test",
                        "status": "past_due",
                        "current_period_end": 1706745600,
                        "metadata": {"user_id": "user-1"}
                    }
                },
                "livemode": false
            }"#,
        )
        .unwrap();

        match event.kind {
            GatewayEventKind::SubscriptionChanged(snapshot) => {
                assert_eq!(snapshot.id, "sub_test");
                assert_eq!(snapshot.status, SubscriptionStatus::PastDue);
                assert_eq!(snapshot.user_id.as_deref(), Some("user-1"));
                assert_eq!(
                    snapshot.current_period_end.map(|t| t.as_unix_secs()),
                    Some(1706745600)
                );
            }
            other => panic!("Expected SubscriptionChanged, got {:?}", other),
        }
    }

    #[test]
    fn expanded_subscription_maps_first_item_price() {
        let sub: StripeSubscription = serde_json::from_str(
            r#"{
                "id": "sub_info",
                "customer": "cus_1",
                "status": "active",
                "current_period_start": 1704067200,
                "current_period_end": 1706745600,
                "cancel_at_period_end": true,
                "items": {"data": [{"price": {
                    "id": "price_monthly",
                    "unit_amount": 999,
                    "currency": "usd",
                    "recurring": {"interval": "month"}
                }}]}
            }"#,
        )
        .unwrap();

        let info = sub.into_info().unwrap();

        assert_eq!(info.status, SubscriptionStatus::Active);
        assert_eq!(info.price_id.as_deref(), Some("price_monthly"));
        assert_eq!(info.amount_cents, 999);
        assert_eq!(info.currency.as_deref(), Some("usd"));
        assert_eq!(info.interval, "month");
        assert!(info.cancel_at_period_end);
        assert_eq!(
            info.current_period_start.map(|t| t.as_unix_secs()),
            Some(1704067200)
        );
    }

    #[test]
    fn subscription_without_items_has_no_price() {
        let sub: StripeSubscription = serde_json::from_str(
            r#"{"id": "sub_bare", "customer": "cus_1", "status": "trialing"}"#,
        )
        .unwrap();

        let info = sub.into_info().unwrap();

        assert_eq!(info.price_id, None);
        assert_eq!(info.amount_cents, 0);
        assert_eq!(info.interval, "month");
    }

    #[test]
    fn unknown_subscription_status_is_parse_error() {
        let result = decode(
            r#"{
                "id": "evt_sub",
                "type": "customer.subscription.updated",
                "data": {"object": {"id": "sub_1", "customer": "cus_1", "status": "weird"}}
            }"#,
        );
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn invoice_failed_uses_amount_due() {
        let event = decode(
            r#"{
                "id": "evt_inv",
                "type": "invoice.payment_failed",
                "data": {
                    "object": {
                        "id": "in_test",
                        "customer": "cus_test",
                        "subscription": "sub_test",
                        "amount_paid": 0,
                        "amount_due": 1999,
                        "currency": "usd"
                    }
                }
            }"#,
        )
        .unwrap();

        match event.kind {
            GatewayEventKind::InvoicePaymentFailed(invoice) => {
                assert_eq!(invoice.amount_cents, 1999);
                assert_eq!(invoice.subscription_id.as_deref(), Some("sub_test"));
            }
            other => panic!("Expected InvoicePaymentFailed, got {:?}", other),
        }
    }

    #[test]
    fn checkout_session_completed_maps_summary() {
        let event = decode(
            r#"{
                "id": "evt_cs",
                "type": "checkout.session.completed",
                "data": {
                    "object": {
                        "id": "cs_test",
                        "mode": "subscription",
                        "customer": "cus_test",
                        "subscription": "sub_test",
                        "metadata": {"user_id": "usr_123"}
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(event.user_hint(), Some("usr_123"));
        match event.kind {
            GatewayEventKind::CheckoutCompleted(summary) => assert!(summary.is_subscription()),
            other => panic!("Expected CheckoutCompleted, got {:?}", other),
        }
    }

    #[test]
    fn unknown_event_type_is_not_an_error() {
        let event = decode(
            r#"{"id": "evt_x", "type": "customer.created", "data": {"object": {"foo": "bar"}}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, GatewayEventKind::Unknown);
        assert_eq!(event.event_type, "customer.created");
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = StripeWebhookEvent::from_slice(b"not json").unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }
}
