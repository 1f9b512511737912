//! ExtendTrialHandler - Command handler for extending a running trial.

use std::sync::Arc;

use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementError, SubscriptionStatus, TrialRejection,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{CommitOutcome, EntitlementChange, EntitlementRepository};

/// Command to extend a trial (support or promotional tooling).
#[derive(Debug, Clone)]
pub struct ExtendTrialCommand {
    pub user_id: UserId,
    pub additional_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendTrialOutcome {
    Extended { new_trial_end_date: Timestamp },
    Rejected(TrialRejection),
}

/// Handler for trial extensions.
pub struct ExtendTrialHandler {
    repository: Arc<dyn EntitlementRepository>,
    enabled: bool,
    max_extension_days: u32,
}

impl ExtendTrialHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        enabled: bool,
        max_extension_days: u32,
    ) -> Self {
        Self {
            repository,
            enabled,
            max_extension_days,
        }
    }

    pub async fn handle(
        &self,
        cmd: ExtendTrialCommand,
    ) -> Result<ExtendTrialOutcome, EntitlementError> {
        if !self.enabled {
            return Ok(ExtendTrialOutcome::Rejected(TrialRejection::ExtensionsDisabled));
        }
        if cmd.additional_days == 0 || cmd.additional_days > self.max_extension_days {
            return Ok(ExtendTrialOutcome::Rejected(
                TrialRejection::InvalidExtensionDays {
                    max: self.max_extension_days,
                },
            ));
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let Some(mut record) = self.repository.find_by_user_id(&cmd.user_id).await? else {
                return Ok(ExtendTrialOutcome::Rejected(TrialRejection::UserNotFound));
            };
            if record.trial_end_date.is_none() {
                return Ok(ExtendTrialOutcome::Rejected(TrialRejection::NoTrialFound));
            }
            if record.subscription_status != SubscriptionStatus::Trialing {
                return Ok(ExtendTrialOutcome::Rejected(TrialRejection::NoActiveTrial));
            }

            let now = Timestamp::now();
            let new_end = record.extend_trial(cmd.additional_days, now)?;
            let audit = AuditEntry::new(
                cmd.user_id.clone(),
                SubscriptionStatus::Trialing,
                record.subscription_status,
                AuditCause::Extended,
                now,
            )
            .with_detail("additional_days", cmd.additional_days)
            .with_detail("new_trial_end_date", new_end.to_string());

            match self
                .repository
                .commit(EntitlementChange::new(record).with_audit(audit))
                .await?
            {
                CommitOutcome::Committed => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        additional_days = cmd.additional_days,
                        new_trial_end_date = %new_end,
                        "Trial extended"
                    );
                    return Ok(ExtendTrialOutcome::Extended {
                        new_trial_end_date: new_end,
                    });
                }
                CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                    tracing::debug!(user_id = %cmd.user_id, attempt, "Trial extension conflicted, retrying");
                }
            }
        }

        Err(EntitlementError::conflict(cmd.user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::entitlement::EntitlementRecord;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn store_with_trial() -> (Arc<InMemoryEntitlementStore>, Timestamp) {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(user("u1"), "a@example.com", now);
        let end = record.start_trial(7, now).unwrap();
        store.seed(record).unwrap();
        (store, end)
    }

    fn cmd(days: u32) -> ExtendTrialCommand {
        ExtendTrialCommand {
            user_id: user("u1"),
            additional_days: days,
        }
    }

    #[tokio::test]
    async fn extends_end_date_and_expiry() {
        let (store, end) = store_with_trial();
        let handler = ExtendTrialHandler::new(store.clone(), true, 30);

        let outcome = handler.handle(cmd(5)).await.unwrap();

        assert_eq!(
            outcome,
            ExtendTrialOutcome::Extended {
                new_trial_end_date: end.add_days(5)
            }
        );
        let record = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(record.trial_end_date, Some(end.add_days(5)));
        assert_eq!(record.expires_at, Some(end.add_days(5)));
    }

    #[tokio::test]
    async fn disabled_extensions_are_rejected_first() {
        let (store, _) = store_with_trial();
        let handler = ExtendTrialHandler::new(store, false, 30);

        let outcome = handler.handle(cmd(0)).await.unwrap();

        assert_eq!(outcome, ExtendTrialOutcome::Rejected(TrialRejection::ExtensionsDisabled));
    }

    #[tokio::test]
    async fn days_outside_range_are_rejected() {
        let (store, end) = store_with_trial();
        let handler = ExtendTrialHandler::new(store.clone(), true, 30);

        for days in [0, 31] {
            let outcome = handler.handle(cmd(days)).await.unwrap();
            assert_eq!(
                outcome,
                ExtendTrialOutcome::Rejected(TrialRejection::InvalidExtensionDays { max: 30 })
            );
        }
        let record = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(record.trial_end_date, Some(end));
    }

    #[tokio::test]
    async fn user_without_trial_is_rejected() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store
            .seed(EntitlementRecord::new(user("u1"), "a@example.com", Timestamp::now()))
            .unwrap();
        let handler = ExtendTrialHandler::new(store, true, 30);

        let outcome = handler.handle(cmd(3)).await.unwrap();

        assert_eq!(outcome, ExtendTrialOutcome::Rejected(TrialRejection::NoTrialFound));
    }

    #[tokio::test]
    async fn paid_user_has_no_active_trial() {
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(user("u1"), "a@example.com", now);
        record.start_trial(7, now).unwrap();
        record.apply_subscription_snapshot(
            SubscriptionStatus::Active,
            Some(now.add_days(30)),
            "sub_1",
            Some("cus_1"),
            now,
        );
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.seed(record).unwrap();
        let handler = ExtendTrialHandler::new(store, true, 30);

        let outcome = handler.handle(cmd(3)).await.unwrap();

        assert_eq!(outcome, ExtendTrialOutcome::Rejected(TrialRejection::NoActiveTrial));
    }
}
