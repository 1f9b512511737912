//! Billing domain: what the payment gateway tells us and how we check it.

mod gateway_event;
mod payment_log;
mod signature;
mod webhook_errors;

pub use gateway_event::{
    CheckoutSummary, GatewayEvent, GatewayEventKind, InvoiceSummary, SubscriptionSnapshot,
};
pub use payment_log::{PaymentLogEntry, PaymentStatus};
pub use signature::{sign_payload, SignatureHeader, SignatureVerifier, DEFAULT_TOLERANCE_SECS};
pub use webhook_errors::WebhookError;
