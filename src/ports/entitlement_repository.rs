//! EntitlementRepository port - conditional writes of entitlement records.
//!
//! Every mutation is a unit of work committed atomically: the new record,
//! the audit rows describing it and any side rows. The write is conditional
//! on the version the caller read, so two racing operations cannot both
//! succeed against the same starting state.

use async_trait::async_trait;

use crate::domain::billing::PaymentLogEntry;
use crate::domain::entitlement::{AuditEntry, EntitlementRecord, TrialDeviceBinding};
use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// Everything one operation writes for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementChange {
    /// New state. `record.version` must be the version that was read.
    pub record: EntitlementRecord,
    pub audit: Vec<AuditEntry>,
    pub device_binding: Option<TrialDeviceBinding>,
    pub payment: Option<PaymentLogEntry>,
}

impl EntitlementChange {
    pub fn new(record: EntitlementRecord) -> Self {
        Self {
            record,
            audit: Vec::new(),
            device_binding: None,
            payment: None,
        }
    }

    pub fn with_audit(mut self, entry: AuditEntry) -> Self {
        self.audit.push(entry);
        self
    }

    pub fn with_device_binding(mut self, binding: Option<TrialDeviceBinding>) -> Self {
        self.device_binding = binding;
        self
    }

    pub fn with_payment(mut self, payment: PaymentLogEntry) -> Self {
        self.payment = Some(payment);
        self
    }
}

/// Result of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Written; the stored version was bumped.
    Committed,
    /// Someone else wrote the record since it was read. Nothing written.
    VersionConflict,
    /// The webhook event in the same unit was already logged. Nothing written.
    DuplicateEvent,
}

#[async_trait]
pub trait EntitlementRepository: Send + Sync {
    /// Insert the record unless one exists for the user.
    ///
    /// Returns the stored record either way.
    async fn insert_if_absent(
        &self,
        record: EntitlementRecord,
    ) -> Result<EntitlementRecord, DomainError>;

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError>;

    async fn find_by_gateway_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError>;

    async fn find_by_gateway_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError>;

    /// Atomically write `change` if the stored version still matches.
    ///
    /// # Errors
    ///
    /// Returns `EntitlementNotFound` if there is no record to update.
    async fn commit(&self, change: EntitlementChange) -> Result<CommitOutcome, DomainError>;

    /// Append a reminder audit row unless a row with the same cause exists
    /// for the user at or after `since`. Returns whether it was appended.
    async fn record_reminder(
        &self,
        entry: AuditEntry,
        since: Timestamp,
    ) -> Result<bool, DomainError>;
}
