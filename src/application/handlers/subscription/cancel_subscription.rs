//! CancelSubscriptionHandler - Command handler ending a paid subscription.

use std::sync::Arc;
use std::time::Duration;

use crate::application::handlers::gateway_call::bounded;
use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementError, EntitlementRecord, SubscriptionRejection,
    SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    CancellationMode, CommitOutcome, EntitlementChange, EntitlementRepository, PaymentGateway,
};

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
    pub mode: CancellationMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelSubscriptionOutcome {
    Canceled {
        mode: CancellationMode,
        /// Premium lasts until here; `None` once access has ended.
        access_until: Option<Timestamp>,
    },
    Rejected(SubscriptionRejection),
}

/// Handler for subscription cancellation.
///
/// An immediate cancellation ends premium at once. An end-of-period
/// cancellation only stops renewal; the downgrade sweep or the gateway's
/// deletion event ends access when the period runs out.
pub struct CancelSubscriptionHandler {
    repository: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl CancelSubscriptionHandler {
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
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionOutcome, EntitlementError> {
        let Some(record) = self.repository.find_by_user_id(&cmd.user_id).await? else {
            return Ok(CancelSubscriptionOutcome::Rejected(
                SubscriptionRejection::UserNotFound,
            ));
        };
        let subscription_id = match Self::precheck(&record) {
            Ok(id) => id,
            Err(rejection) => {
                tracing::info!(user_id = %cmd.user_id, %rejection, "Cancellation rejected");
                return Ok(CancelSubscriptionOutcome::Rejected(rejection));
            }
        };

        let snapshot = bounded(
            self.gateway_timeout,
            "cancel_subscription",
            self.gateway.cancel_subscription(&subscription_id, cmd.mode),
        )
        .await?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut record = self
                .repository
                .find_by_user_id(&cmd.user_id)
                .await?
                .ok_or_else(|| EntitlementError::not_found(cmd.user_id.clone()))?;

            let now = Timestamp::now();
            let (transition, cause) = match cmd.mode {
                CancellationMode::Immediately => (record.mark_canceled(now), AuditCause::Canceled),
                CancellationMode::AtPeriodEnd => {
                    let transition = record.apply_subscription_snapshot(
                        snapshot.status,
                        snapshot.current_period_end,
                        &snapshot.id,
                        Some(&snapshot.customer_id),
                        now,
                    );
                    record.set_cancel_at_period_end(true, now);
                    (transition, AuditCause::CancelScheduled)
                }
            };
            let access_until = if record.is_premium { record.expires_at } else { None };
            let audit = AuditEntry::for_transition(cmd.user_id.clone(), &transition, cause, now)
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
                        mode = ?cmd.mode,
                        "Subscription canceled"
                    );
                    return Ok(CancelSubscriptionOutcome::Canceled {
                        mode: cmd.mode,
                        access_until,
                    });
                }
                CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                    tracing::debug!(user_id = %cmd.user_id, attempt, "Cancellation commit conflicted, retrying");
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
        Ok(subscription_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::application::handlers::subscription::test_support::{paid, user};
    use crate::ports::{EntitlementReader, GatewayError};

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn setup() -> (Arc<InMemoryEntitlementStore>, MockPaymentGateway, CancelSubscriptionHandler) {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let gateway = MockPaymentGateway::new();
        let handler = CancelSubscriptionHandler::new(
            store.clone(),
            Arc::new(gateway.clone()),
            Duration::from_millis(200),
        );
        (store, gateway, handler)
    }

    fn cmd(id: &str, mode: CancellationMode) -> CancelSubscriptionCommand {
        CancelSubscriptionCommand {
            user_id: user(id),
            mode,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Cancellation Mode Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn immediate_cancellation_ends_premium() {
        let (store, gateway, handler) = setup();
        store.seed(paid("u1", &gateway)).unwrap();

        let outcome = handler
            .handle(cmd("u1", CancellationMode::Immediately))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelSubscriptionOutcome::Canceled {
                mode: CancellationMode::Immediately,
                access_until: None,
            }
        );
        let record = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Canceled);
        assert!(!record.is_premium);
        assert!(!record.cancel_at_period_end);

        let trail = store.audit_trail(&user("u1")).await.unwrap();
        let last = trail.last().unwrap();
        assert_eq!(last.cause, AuditCause::Canceled);
        assert_eq!(last.from_state, SubscriptionStatus::Active);
        assert_eq!(last.to_state, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn cancellation_at_period_end_keeps_premium_until_expiry() {
        let (store, gateway, handler) = setup();
        let record = paid("u1", &gateway);
        let period_end = record.expires_at;
        store.seed(record).unwrap();

        let outcome = handler
            .handle(cmd("u1", CancellationMode::AtPeriodEnd))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelSubscriptionOutcome::Canceled {
                mode: CancellationMode::AtPeriodEnd,
                access_until: period_end,
            }
        );
        let record = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(record.subscription_status, SubscriptionStatus::Active);
        assert!(record.is_premium);
        assert!(record.cancel_at_period_end);

        let trail = store.audit_trail(&user("u1")).await.unwrap();
        assert_eq!(trail.last().map(|e| e.cause), Some(AuditCause::CancelScheduled));
        assert_eq!(gateway.calls()[0].args[1], "AtPeriodEnd");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unknown_user_is_rejected() {
        let (_store, gateway, handler) = setup();

        let outcome = handler
            .handle(cmd("ghost", CancellationMode::Immediately))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelSubscriptionOutcome::Rejected(SubscriptionRejection::UserNotFound)
        );
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn user_without_subscription_is_rejected() {
        let (store, gateway, handler) = setup();
        store
            .seed(EntitlementRecord::new(user("u1"), "a@example.com", Timestamp::now()))
            .unwrap();

        let outcome = handler
            .handle(cmd("u1", CancellationMode::AtPeriodEnd))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelSubscriptionOutcome::Rejected(SubscriptionRejection::NoSubscriptionFound)
        );
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn canceled_subscription_is_rejected() {
        let (store, gateway, handler) = setup();
        let mut record = paid("u1", &gateway);
        record.mark_canceled(Timestamp::now());
        store.seed(record).unwrap();

        let outcome = handler
            .handle(cmd("u1", CancellationMode::Immediately))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CancelSubscriptionOutcome::Rejected(SubscriptionRejection::AlreadyCanceled)
        );
        assert!(!gateway.was_called("cancel_subscription"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Gateway Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn gateway_failure_leaves_record_untouched() {
        let (store, gateway, handler) = setup();
        store.seed(paid("u1", &gateway)).unwrap();
        gateway.set_method_error("cancel_subscription", GatewayError::network("reset"));
        let before = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();

        let err = handler
            .handle(cmd("u1", CancellationMode::Immediately))
            .await
            .unwrap_err();

        assert!(matches!(err, EntitlementError::Gateway { retryable: true, .. }));
        let after = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn store_failure_after_gateway_cancel_is_surfaced() {
        let (store, gateway, handler) = setup();
        store.seed(paid("u1", &gateway)).unwrap();
        store.fail_commits_for(user("u1")).unwrap();

        let result = handler
            .handle(cmd("u1", CancellationMode::Immediately))
            .await;

        assert!(result.is_err());
        assert!(gateway.was_called("cancel_subscription"));
    }
}
