//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers write through conditional commits; query handlers only
//! read. [`EntitlementService`] bundles them and [`ReconciliationScheduler`]
//! drives the periodic sweeps.

pub mod handlers;
mod scheduler;
mod service;

pub use handlers::{
    AuditReport, CancelSubscriptionOutcome, ConvertTrialOutcome, EntitlementStatsView,
    ExtendTrialOutcome, IngestWebhookResult, ReactivateSubscriptionOutcome, ReminderReport,
    StartTrialOutcome, SweepReport,
};
pub use scheduler::{ReconciliationScheduler, SchedulerHandle};
pub use service::{EntitlementService, ServiceDependencies};
