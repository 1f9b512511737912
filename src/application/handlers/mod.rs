//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

mod gateway_call;
pub mod reconciliation;
pub mod reporting;
mod retry;
pub mod subscription;
pub mod trial;
pub mod webhook;

pub use reconciliation::{
    AuditReport, DowngradeSweepHandler, FullAuditHandler, ReminderReport, ReminderSweepHandler,
    SweepReport,
};
pub use reporting::{
    EntitlementStatsView, GetAuditTrailHandler, GetEntitlementStatsHandler, GetHistoryQuery,
    GetPaymentHistoryHandler,
};
pub use subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionOutcome,
    GetSubscriptionInfoHandler, GetSubscriptionInfoQuery, ReactivateSubscriptionCommand,
    ReactivateSubscriptionHandler, ReactivateSubscriptionOutcome,
};
pub use trial::{
    CheckEligibilityHandler, CheckEligibilityQuery, ConvertTrialCommand, ConvertTrialHandler,
    ConvertTrialOutcome, EnsureEntitlementCommand, EnsureEntitlementHandler, ExtendTrialCommand,
    ExtendTrialHandler, ExtendTrialOutcome, GetTrialStatusHandler, GetTrialStatusQuery,
    StartTrialCommand, StartTrialHandler, StartTrialOutcome,
};
pub use webhook::{
    IngestWebhookCommand, IngestWebhookHandler, IngestWebhookResult, PruneWebhookLogCommand,
    PruneWebhookLogHandler,
};
