//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresEntitlementRepository` - conditional writes and reminder claims
//! - `PostgresEntitlementReader` - counts, sweep selections and reporting
//! - `PostgresWebhookEventRepository` - webhook log committed with its effect

mod entitlement_reader;
mod entitlement_repository;
mod webhook_event_repository;

pub use entitlement_reader::PostgresEntitlementReader;
pub use entitlement_repository::PostgresEntitlementRepository;
pub use webhook_event_repository::PostgresWebhookEventRepository;
