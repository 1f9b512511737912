//! Per-record reconciliation shared by the sweeps.

use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{AuditCause, AuditEntry, Transition};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{CommitOutcome, EntitlementChange, EntitlementRepository};

/// Re-reads and reconciles one record, committing only if it moved.
///
/// Returns the committed transition, or `None` if the record was already
/// consistent (or disappeared) by the time it was read.
pub(crate) async fn reconcile_user(
    repository: &dyn EntitlementRepository,
    user_id: &UserId,
    cause_for: impl Fn(&Transition) -> AuditCause,
) -> Result<Option<Transition>, DomainError> {
    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let Some(mut record) = repository.find_by_user_id(user_id).await? else {
            return Ok(None);
        };

        let now = Timestamp::now();
        let transition = record.reconcile(now);
        if transition.is_noop() {
            return Ok(None);
        }

        let audit = AuditEntry::for_transition(user_id.clone(), &transition, cause_for(&transition), now);
        match repository
            .commit(EntitlementChange::new(record).with_audit(audit))
            .await?
        {
            CommitOutcome::Committed => return Ok(Some(transition)),
            CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                tracing::debug!(user_id = %user_id, attempt, "Reconciliation conflicted, retrying");
            }
        }
    }

    Err(DomainError::new(
        ErrorCode::VersionConflict,
        format!("Gave up reconciling user {} after repeated conflicts", user_id),
    ))
}
