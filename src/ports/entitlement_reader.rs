//! EntitlementReader port - queries for eligibility, sweeps and reporting.
//!
//! Sweep selections return user ids only; callers re-read each record
//! through [`super::EntitlementRepository`] before deciding anything.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::billing::PaymentLogEntry;
use crate::domain::entitlement::{AuditEntry, EntitlementRecord};
use crate::domain::foundation::{DeviceId, DomainError, Timestamp, UserId};

#[async_trait]
pub trait EntitlementReader: Send + Sync {
    /// Records sharing `email` (normalized) whose trial has been used.
    async fn count_used_trials_by_email(&self, email: &str) -> Result<u32, DomainError>;

    /// Distinct users that started a trial from `device_id`.
    async fn count_device_bindings(&self, device_id: &DeviceId) -> Result<u32, DomainError>;

    /// `is_premium = true` and (`expires_at < now` or status lapsed).
    async fn find_downgrade_candidates(&self, now: Timestamp) -> Result<Vec<UserId>, DomainError>;

    /// Trialing records whose trial ends in `[start, end)`.
    async fn find_trials_ending_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<EntitlementRecord>, DomainError>;

    /// `is_premium = true` or a gateway subscription reference.
    async fn find_audit_candidates(&self) -> Result<Vec<UserId>, DomainError>;

    /// Audit trail for a user, oldest first.
    async fn audit_trail(&self, user_id: &UserId) -> Result<Vec<AuditEntry>, DomainError>;

    /// Payment log for a user, oldest first.
    async fn payment_history(&self, user_id: &UserId)
        -> Result<Vec<PaymentLogEntry>, DomainError>;

    async fn statistics(&self) -> Result<EntitlementStatistics, DomainError>;
}

/// Aggregate counters for operational dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntitlementStatistics {
    pub total_records: u64,
    pub premium: u64,
    pub trialing: u64,
    pub active: u64,
    pub canceled: u64,
    /// `expired` plus `trial_expired`.
    pub expired: u64,
    pub trials_started: u64,
    /// Used-trial records whose subscription is now `active`.
    pub converted_trials: u64,
    /// Mean whole days from trial start to the current expiry (or now),
    /// over records that started a trial.
    pub average_trial_duration_days: f64,
}

impl EntitlementStatistics {
    /// Converted trials as a percentage of started trials, one decimal.
    pub fn conversion_rate(&self) -> f64 {
        if self.trials_started == 0 {
            return 0.0;
        }
        let rate = self.converted_trials as f64 / self.trials_started as f64 * 100.0;
        (rate * 10.0).round() / 10.0
    }
}
