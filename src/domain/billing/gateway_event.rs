//! Gateway events, decoded once at the boundary.
//!
//! Adapters turn the gateway's JSON into one of these variants; everything
//! downstream matches exhaustively instead of poking at untyped fields.

use crate::domain::entitlement::SubscriptionStatus;
use crate::domain::foundation::Timestamp;

/// A verified webhook event from the payment gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    /// Gateway-assigned unique id; the idempotency key.
    pub id: String,
    /// Raw type string, kept for logs and the event log.
    pub event_type: String,
    pub created: Option<Timestamp>,
    pub livemode: bool,
    pub kind: GatewayEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEventKind {
    /// `customer.subscription.created` / `customer.subscription.updated`.
    SubscriptionChanged(SubscriptionSnapshot),
    /// `customer.subscription.deleted`.
    SubscriptionDeleted(SubscriptionSnapshot),
    /// `invoice.payment_succeeded`.
    InvoicePaid(InvoiceSummary),
    /// `invoice.payment_failed`.
    InvoicePaymentFailed(InvoiceSummary),
    /// `checkout.session.completed`.
    CheckoutCompleted(CheckoutSummary),
    /// Anything else; logged and ignored.
    Unknown,
}

/// Authoritative view of a gateway subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,
    /// `metadata.user_id`, when the subscription was created by this core.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceSummary {
    pub id: String,
    pub customer_id: String,
    pub subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSummary {
    pub session_id: String,
    /// `payment`, `subscription` or `setup`.
    pub mode: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub user_id: Option<String>,
}

impl CheckoutSummary {
    pub fn is_subscription(&self) -> bool {
        self.mode == "subscription"
    }
}

impl GatewayEvent {
    /// Gateway references usable to find the owning account, most specific first.
    pub fn user_hint(&self) -> Option<&str> {
        match &self.kind {
            GatewayEventKind::SubscriptionChanged(s) | GatewayEventKind::SubscriptionDeleted(s) => {
                s.user_id.as_deref()
            }
            GatewayEventKind::InvoicePaid(i) | GatewayEventKind::InvoicePaymentFailed(i) => {
                i.user_id.as_deref()
            }
            GatewayEventKind::CheckoutCompleted(c) => c.user_id.as_deref(),
            GatewayEventKind::Unknown => None,
        }
    }
}
