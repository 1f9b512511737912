//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `memory` - In-memory store and recording notifier (tests, local runs)
//! - `notification` - Notification queue implementations
//! - `postgres` - PostgreSQL storage
//! - `stripe` - Stripe payment gateway

pub mod memory;
pub mod notification;
pub mod postgres;
pub mod stripe;

pub use memory::{InMemoryEntitlementStore, RecordingNotifier};
pub use notification::{PostgresNotifier, TracingNotifier};
pub use postgres::{
    PostgresEntitlementReader, PostgresEntitlementRepository, PostgresWebhookEventRepository,
};
pub use stripe::{MockPaymentGateway, StripeConfig, StripeGateway};
