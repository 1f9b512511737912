//! StartTrialHandler - Command handler for starting a premium trial.

use std::sync::Arc;

use super::check_eligibility::evaluate_eligibility;
use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{
    AuditCause, AuditEntry, Eligibility, EligibilityPolicy, EntitlementError, IneligibleReason,
    SubscriptionStatus, TrialDeviceBinding, TrialRejection,
};
use crate::domain::foundation::{DeviceId, ErrorCode, Timestamp, UserId};
use crate::ports::{CommitOutcome, EntitlementChange, EntitlementReader, EntitlementRepository};

/// Command to start a trial.
#[derive(Debug, Clone)]
pub struct StartTrialCommand {
    pub user_id: UserId,
    pub device_id: Option<DeviceId>,
}

/// Result of a trial start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartTrialOutcome {
    Started { trial_end_date: Timestamp },
    Rejected(TrialRejection),
}

/// Handler for starting trials.
///
/// Eligibility is evaluated against the same version that is committed, so
/// two concurrent starts for one user cannot both succeed.
pub struct StartTrialHandler {
    repository: Arc<dyn EntitlementRepository>,
    reader: Arc<dyn EntitlementReader>,
    policy: EligibilityPolicy,
    duration_days: u32,
}

impl StartTrialHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        reader: Arc<dyn EntitlementReader>,
        policy: EligibilityPolicy,
        duration_days: u32,
    ) -> Self {
        Self {
            repository,
            reader,
            policy,
            duration_days,
        }
    }

    pub async fn handle(&self, cmd: StartTrialCommand) -> Result<StartTrialOutcome, EntitlementError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let Some(mut record) = self.repository.find_by_user_id(&cmd.user_id).await? else {
                return Ok(StartTrialOutcome::Rejected(TrialRejection::UserNotFound));
            };

            let eligibility =
                evaluate_eligibility(&*self.reader, &self.policy, &record, cmd.device_id.as_ref())
                    .await?;
            if let Eligibility::Ineligible(reason) = eligibility {
                tracing::info!(user_id = %cmd.user_id, %reason, "Trial start rejected");
                return Ok(StartTrialOutcome::Rejected(reason.into()));
            }

            let now = Timestamp::now();
            let from = record.subscription_status;
            let trial_end = match record.start_trial(self.duration_days, now) {
                Ok(end) => end,
                Err(e) if e.code == ErrorCode::InvalidStateTransition => {
                    return Ok(StartTrialOutcome::Rejected(
                        IneligibleReason::AlreadySubscribed.into(),
                    ));
                }
                Err(e) => return Err(e.into()),
            };

            let audit = AuditEntry::new(
                cmd.user_id.clone(),
                from,
                SubscriptionStatus::Trialing,
                AuditCause::Started,
                now,
            )
            .with_detail("trial_end_date", trial_end.to_string())
            .with_detail("duration_days", self.duration_days);
            let binding = cmd
                .device_id
                .clone()
                .map(|device_id| TrialDeviceBinding::new(device_id, cmd.user_id.clone(), now));
            let change = EntitlementChange::new(record)
                .with_audit(audit)
                .with_device_binding(binding);

            match self.repository.commit(change).await? {
                CommitOutcome::Committed => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        trial_end_date = %trial_end,
                        "Trial started"
                    );
                    return Ok(StartTrialOutcome::Started {
                        trial_end_date: trial_end,
                    });
                }
                CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                    tracing::debug!(user_id = %cmd.user_id, attempt, "Trial start lost a race, retrying");
                }
            }
        }

        Err(EntitlementError::conflict(cmd.user_id))
    }
}
