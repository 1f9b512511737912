//! In-memory adapters.

mod entitlement_store;
mod notifier;

pub use entitlement_store::InMemoryEntitlementStore;
pub use notifier::RecordingNotifier;
