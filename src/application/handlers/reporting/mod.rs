//! Read-only reporting queries.

mod get_entitlement_stats;
mod get_history;

pub use get_entitlement_stats::{EntitlementStatsView, GetEntitlementStatsHandler};
pub use get_history::{GetAuditTrailHandler, GetHistoryQuery, GetPaymentHistoryHandler};
