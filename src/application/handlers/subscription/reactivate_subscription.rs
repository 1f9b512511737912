//! ReactivateSubscriptionHandler - Command handler withdrawing a scheduled cancellation.

use std::sync::Arc;
use std::time::Duration;

use crate::application::handlers::gateway_call::bounded;
use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementError, EntitlementRecord, SubscriptionRejection,
    SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{CommitOutcome, EntitlementChange, EntitlementRepository, PaymentGateway};

#[derive(Debug, Clone)]
pub struct ReactivateSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactivateSubscriptionOutcome {
    Reactivated {
        status: SubscriptionStatus,
        current_period_end: Option<Timestamp>,
    },
    Rejected(SubscriptionRejection),
}

/// Handler for subscription reactivation.
///
/// Only an end-of-period cancellation can be withdrawn; a subscription the
/// gateway has already ended needs a new conversion.
pub struct ReactivateSubscriptionHandler {
    repository: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl ReactivateSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            gateway_timeout,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReactivateSubscriptionCommand,
    ) -> Result<ReactivateSubscriptionOutcome, EntitlementError> {
        let Some(record) = self.repository.find_by_user_id(&cmd.user_id).await? else {
            return Ok(ReactivateSubscriptionOutcome::Rejected(
                SubscriptionRejection::UserNotFound,
            ));
        };
        let subscription_id = match Self::precheck(&record) {
            Ok(id) => id,
            Err(rejection) => {
                tracing::info!(user_id = %cmd.user_id, %rejection, "Reactivation rejected");
                return Ok(ReactivateSubscriptionOutcome::Rejected(rejection));
            }
        };

        let snapshot = bounded(
            self.gateway_timeout,
            "reactivate_subscription",
            self.gateway.reactivate_subscription(&subscription_id),
        )
        .await?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut record = self
                .repository
                .find_by_user_id(&cmd.user_id)
                .await?
                .ok_or_else(|| EntitlementError::not_found(cmd.user_id.clone()))?;

            let now = Timestamp::now();
            let transition = record.apply_subscription_snapshot(
                snapshot.status,
                snapshot.current_period_end,
                &snapshot.id,
                Some(&snapshot.customer_id),
                now,
            );
            record.set_cancel_at_period_end(false, now);
            let audit = AuditEntry::for_transition(
                cmd.user_id.clone(),
                &transition,
                AuditCause::Reactivated,
                now,
            )
            .with_detail("subscription_id", snapshot.id.clone());

            match self
                .repository
                .commit(EntitlementChange::new(record).with_audit(audit))
                .await?
            {
                CommitOutcome::Committed => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        subscription_id = %snapshot.id,
                        "Subscription reactivated"
                    );
                    return Ok(ReactivateSubscriptionOutcome::Reactivated {
                        status: snapshot.status,
                        current_period_end: snapshot.current_period_end,
                    });
                }
                CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                    tracing::debug!(user_id = %cmd.user_id, attempt, "Reactivation commit conflicted, retrying");
                }
            }
        }

        Err(EntitlementError::conflict(cmd.user_id))
    }

    fn precheck(record: &EntitlementRecord) -> Result<String, SubscriptionRejection> {
        let Some(subscription_id) = record.gateway_subscription_id.clone() else {
            return Err(SubscriptionRejection::NoSubscriptionFound);
        };
        if record.subscription_status == SubscriptionStatus::Canceled {
            return Err(SubscriptionRejection::AlreadyCanceled);
        }
        if !record.cancel_at_period_end {
            return Err(SubscriptionRejection::NotScheduledForCancellation);
        }
        Ok(subscription_id)
    }
}
