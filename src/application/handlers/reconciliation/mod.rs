//! Reconciliation sweeps: keep `is_premium` true to its derivation.

mod downgrade_sweep;
mod full_audit;
mod reconcile;
mod reminder_sweep;

pub use downgrade_sweep::{DowngradeSweepHandler, SweepReport};
pub use full_audit::{AuditReport, FullAuditHandler};
pub use reminder_sweep::{ReminderReport, ReminderSweepHandler};
