//! FullAuditHandler - Re-derives premium for every paid or premium record.

use std::sync::Arc;

use serde::Serialize;

use super::reconcile::reconcile_user;
use crate::domain::entitlement::{AuditCause, EntitlementError, SubscriptionStatus};
use crate::ports::{EntitlementReader, EntitlementRepository};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub examined: u32,
    pub updated: u32,
    pub errors: u32,
}

/// On-demand consistency check. Sends no notifications.
pub struct FullAuditHandler {
    repository: Arc<dyn EntitlementRepository>,
    reader: Arc<dyn EntitlementReader>,
}

impl FullAuditHandler {
    pub fn new(repository: Arc<dyn EntitlementRepository>, reader: Arc<dyn EntitlementReader>) -> Self {
        Self { repository, reader }
    }

    pub async fn handle(&self) -> Result<AuditReport, EntitlementError> {
        let candidates = self.reader.find_audit_candidates().await?;
        let mut report = AuditReport::default();

        for user_id in candidates {
            report.examined += 1;
            let result = reconcile_user(&*self.repository, &user_id, |t| {
                if t.gained_premium() {
                    AuditCause::Upgraded
                } else if t.to == SubscriptionStatus::TrialExpired {
                    AuditCause::TrialExpired
                } else {
                    AuditCause::Downgraded
                }
            })
            .await;

            match result {
                Ok(Some(transition)) => {
                    report.updated += 1;
                    tracing::info!(
                        user_id = %user_id,
                        from = transition.from.as_str(),
                        to = transition.to.as_str(),
                        is_premium = transition.is_premium,
                        "Audit corrected entitlement"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(user_id = %user_id, error = %e, "Audit failed for record");
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            updated = report.updated,
            errors = report.errors,
            "Full audit finished"
        );
        Ok(report)
    }
}
