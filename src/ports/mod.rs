//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `EntitlementRepository` - conditional writes of entitlement records
//! - `EntitlementReader` - counts, sweep selections and reporting
//! - `WebhookEventRepository` - webhook idempotency log
//! - `PaymentGateway` - the external payment provider
//! - `Notifier` - fire-and-forget user notifications

mod entitlement_reader;
mod entitlement_repository;
mod notifier;
mod payment_gateway;
mod webhook_event_repository;

pub use entitlement_reader::{EntitlementReader, EntitlementStatistics};
pub use entitlement_repository::{CommitOutcome, EntitlementChange, EntitlementRepository};
pub use notifier::Notifier;
pub use payment_gateway::{
    CancellationMode, CreateCustomerRequest, CreateSubscriptionRequest, Customer, GatewayError,
    GatewayErrorCode, PaymentGateway, SubscriptionInfo,
};
pub use webhook_event_repository::{
    WebhookDisposition, WebhookEventRecord, WebhookEventRepository,
};
