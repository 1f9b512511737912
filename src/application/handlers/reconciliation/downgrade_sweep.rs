//! DowngradeSweepHandler - Revokes premium that has run out.

use std::sync::Arc;

use serde::Serialize;

use super::reconcile::reconcile_user;
use crate::domain::entitlement::{
    AuditCause, EntitlementError, Notification, SubscriptionStatus,
};
use crate::domain::foundation::Timestamp;
use crate::ports::{EntitlementReader, EntitlementRepository, Notifier};

/// Counters for one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: u32,
    pub corrected: u32,
    pub errors: u32,
}

/// Handler for the periodic downgrade sweep.
///
/// A failing record is logged and counted; the rest of the batch still runs.
pub struct DowngradeSweepHandler {
    repository: Arc<dyn EntitlementRepository>,
    reader: Arc<dyn EntitlementReader>,
    notifier: Arc<dyn Notifier>,
}

impl DowngradeSweepHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        reader: Arc<dyn EntitlementReader>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repository,
            reader,
            notifier,
        }
    }

    pub async fn handle(&self) -> Result<SweepReport, EntitlementError> {
        let candidates = self.reader.find_downgrade_candidates(Timestamp::now()).await?;
        let mut report = SweepReport::default();

        for user_id in candidates {
            report.examined += 1;
            let result = reconcile_user(&*self.repository, &user_id, |t| {
                if t.to == SubscriptionStatus::TrialExpired {
                    AuditCause::TrialExpired
                } else {
                    AuditCause::Downgraded
                }
            })
            .await;

            match result {
                Ok(Some(transition)) => {
                    report.corrected += 1;
                    tracing::info!(
                        user_id = %user_id,
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        "Premium revoked"
                    );
                    let now = Timestamp::now();
                    let notification = if transition.from == SubscriptionStatus::Trialing
                        && transition.to == SubscriptionStatus::TrialExpired
                    {
                        Notification::trial_expired(user_id.clone(), now)
                    } else {
                        Notification::subscription_expired(user_id.clone(), now)
                    };
                    if let Err(e) = self.notifier.notify(notification).await {
                        tracing::warn!(user_id = %user_id, error = %e, "Failed to queue notification");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(user_id = %user_id, error = %e, "Downgrade failed");
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            corrected = report.corrected,
            errors = report.errors,
            "Downgrade sweep finished"
        );
        Ok(report)
    }
}
