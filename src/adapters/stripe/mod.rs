//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port for Stripe, including:
//! - Customer and subscription creation with idempotency keys
//! - Subscription lookup
//! - Webhook signature verification and event decoding
//!
//! # Configuration
//!
//! Required environment variables:
//! - `ENTITLEMENTS__PAYMENT__STRIPE_API_KEY`
//! - `ENTITLEMENTS__PAYMENT__STRIPE_WEBHOOK_SECRET`

mod mock_payment_gateway;
mod stripe_gateway;
mod wire_types;

pub use mock_payment_gateway::{MethodCall, MockPaymentGateway};
pub use stripe_gateway::{StripeConfig, StripeGateway};
pub use wire_types::StripeWebhookEvent;
