//! ConvertTrialHandler - Command handler turning a trial into a paid subscription.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::application::handlers::gateway_call::bounded;
use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementError, EntitlementRecord, SubscriptionStatus,
    TrialRejection,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    CommitOutcome, CreateCustomerRequest, CreateSubscriptionRequest, EntitlementChange,
    EntitlementRepository, GatewayError, PaymentGateway,
};

/// Command to convert a running trial.
#[derive(Debug, Clone)]
pub struct ConvertTrialCommand {
    pub user_id: UserId,
    pub price_id: String,
    pub payment_method_id: Option<String>,
}

/// Result of a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertTrialOutcome {
    /// The gateway accepted the subscription. Premium state is settled by
    /// the gateway's subscription webhook.
    Converted {
        subscription_id: String,
        customer_id: String,
        status: SubscriptionStatus,
    },
    Rejected(TrialRejection),
}

/// Handler for trial conversion.
///
/// Gateway calls carry idempotency keys derived from the user and price, so
/// a retried conversion never creates a second subscription.
pub struct ConvertTrialHandler {
    repository: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl ConvertTrialHandler {
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
        cmd: ConvertTrialCommand,
    ) -> Result<ConvertTrialOutcome, EntitlementError> {
        if cmd.price_id.trim().is_empty() {
            return Err(EntitlementError::validation("price_id", "must not be empty"));
        }

        let Some(record) = self.repository.find_by_user_id(&cmd.user_id).await? else {
            return Ok(ConvertTrialOutcome::Rejected(TrialRejection::UserNotFound));
        };
        if let Some(rejection) = Self::precheck(&record, Timestamp::now()) {
            tracing::info!(user_id = %cmd.user_id, %rejection, "Trial conversion rejected");
            return Ok(ConvertTrialOutcome::Rejected(rejection));
        }

        // 1. Reuse the customer from an earlier attempt when there is one
        let customer_id = match record.gateway_customer_id.clone() {
            Some(id) => id,
            None => {
                let request = CreateCustomerRequest {
                    user_id: cmd.user_id.clone(),
                    email: record.email.clone(),
                    idempotency_key: Some(format!("customer-{}", cmd.user_id)),
                };
                self.call("create_customer", self.gateway.create_customer(request))
                    .await?
                    .id
            }
        };

        // 2. Create the subscription; it bills immediately
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), cmd.user_id.to_string());
        let request = CreateSubscriptionRequest {
            customer_id: customer_id.clone(),
            price_id: cmd.price_id.clone(),
            trial_days: None,
            payment_method_id: cmd.payment_method_id.clone(),
            metadata,
            idempotency_key: Some(format!("convert-{}-{}", cmd.user_id, cmd.price_id)),
        };
        let subscription = self
            .call("create_subscription", self.gateway.create_subscription(request))
            .await?;

        // 3. Store the references
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut record = self
                .repository
                .find_by_user_id(&cmd.user_id)
                .await?
                .ok_or_else(|| EntitlementError::not_found(cmd.user_id.clone()))?;

            let now = Timestamp::now();
            record.attach_gateway_subscription(&customer_id, &subscription.id, now);
            let status = record.subscription_status;
            let audit = AuditEntry::new(cmd.user_id.clone(), status, status, AuditCause::Converted, now)
                .with_detail("subscription_id", subscription.id.clone())
                .with_detail("price_id", cmd.price_id.clone())
                .with_detail("gateway_status", subscription.status.as_str());

            match self
                .repository
                .commit(EntitlementChange::new(record).with_audit(audit))
                .await?
            {
                CommitOutcome::Committed => {
                    tracing::info!(
                        user_id = %cmd.user_id,
                        subscription_id = %subscription.id,
                        status = subscription.status.as_str(),
                        "Trial converted"
                    );
                    return Ok(ConvertTrialOutcome::Converted {
                        subscription_id: subscription.id,
                        customer_id,
                        status: subscription.status,
                    });
                }
                CommitOutcome::VersionConflict | CommitOutcome::DuplicateEvent => {
                    tracing::debug!(user_id = %cmd.user_id, attempt, "Conversion commit conflicted, retrying");
                }
            }
        }

        Err(EntitlementError::conflict(cmd.user_id))
    }

    fn precheck(record: &EntitlementRecord, now: Timestamp) -> Option<TrialRejection> {
        let Some(trial_end) = record.trial_end_date else {
            return Some(TrialRejection::NoTrialFound);
        };
        if record.subscription_status != SubscriptionStatus::Trialing {
            return Some(TrialRejection::NoActiveTrial);
        }
        if !trial_end.is_after(&now) {
            return Some(TrialRejection::TrialExpired);
        }
        None
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, EntitlementError> {
        bounded(self.gateway_timeout, operation, fut).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::ports::EntitlementReader;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn trialing(id: &str, days_left: i64) -> EntitlementRecord {
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(user(id), "t@example.com", now.minus_days(10));
        record.start_trial(7, now.minus_days(7 - days_left)).unwrap();
        record
    }

    fn setup(record: EntitlementRecord) -> (Arc<InMemoryEntitlementStore>, MockPaymentGateway, ConvertTrialHandler) {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store.seed(record).unwrap();
        let gateway = MockPaymentGateway::new();
        let handler = ConvertTrialHandler::new(
            store.clone(),
            Arc::new(gateway.clone()),
            Duration::from_millis(200),
        );
        (store, gateway, handler)
    }

    fn cmd(id: &str) -> ConvertTrialCommand {
        ConvertTrialCommand {
            user_id: user(id),
            price_id: "price_monthly".to_string(),
            payment_method_id: Some("pm_card".to_string()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn converts_active_trial() {
        let (store, gateway, handler) = setup(trialing("u1", 3));

        let outcome = handler.handle(cmd("u1")).await.unwrap();

        let ConvertTrialOutcome::Converted {
            subscription_id,
            customer_id,
            ..
        } = outcome
        else {
            panic!("expected Converted, got {:?}", outcome);
        };
        assert!(gateway.was_called("create_customer"));
        assert!(gateway.was_called("create_subscription"));

        let record = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(record.gateway_subscription_id, Some(subscription_id));
        assert_eq!(record.gateway_customer_id, Some(customer_id));
        assert_eq!(record.subscription_status, SubscriptionStatus::Trialing);
        assert!(record.is_premium);

        let trail = store.audit_trail(&user("u1")).await.unwrap();
        assert_eq!(trail.last().map(|e| e.cause), Some(AuditCause::Converted));
    }

    #[tokio::test]
    async fn reuses_existing_customer() {
        let mut record = trialing("u1", 3);
        record.gateway_customer_id = Some("cus_existing".to_string());
        let (_store, gateway, handler) = setup(record);

        let outcome = handler.handle(cmd("u1")).await.unwrap();

        assert!(matches!(
            outcome,
            ConvertTrialOutcome::Converted { ref customer_id, .. } if customer_id == "cus_existing"
        ));
        assert!(!gateway.was_called("create_customer"));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Rejection Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn user_without_trial_is_rejected() {
        let (_store, gateway, handler) =
            setup(EntitlementRecord::new(user("u1"), "a@example.com", Timestamp::now()));

        let outcome = handler.handle(cmd("u1")).await.unwrap();

        assert_eq!(outcome, ConvertTrialOutcome::Rejected(TrialRejection::NoTrialFound));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn expired_trial_is_rejected() {
        let mut record = trialing("u1", -1);
        record.is_premium = false;
        let (_store, gateway, handler) = setup(record);

        let outcome = handler.handle(cmd("u1")).await.unwrap();

        assert_eq!(outcome, ConvertTrialOutcome::Rejected(TrialRejection::TrialExpired));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn lapsed_status_is_not_an_active_trial() {
        let mut record = trialing("u1", -1);
        record.reconcile(Timestamp::now());
        let (_store, _gateway, handler) = setup(record);

        let outcome = handler.handle(cmd("u1")).await.unwrap();

        assert_eq!(outcome, ConvertTrialOutcome::Rejected(TrialRejection::NoActiveTrial));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Gateway Failure Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn declined_card_surfaces_gateway_error_and_leaves_record() {
        let (store, gateway, handler) = setup(trialing("u1", 3));
        gateway.set_method_error("create_subscription", GatewayError::card_declined("Your card was declined"));
        let before = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();

        let err = handler.handle(cmd("u1")).await.unwrap_err();

        assert!(matches!(err, EntitlementError::Gateway { retryable: false, .. }));
        let after = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn slow_gateway_times_out_and_leaves_record() {
        let (store, gateway, handler) = setup(trialing("u1", 3));
        gateway.set_delay(Duration::from_secs(5));
        let before = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();

        let err = handler.handle(cmd("u1")).await.unwrap_err();

        assert!(matches!(err, EntitlementError::GatewayTimeout { .. }));
        let after = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn blank_price_is_a_validation_error() {
        let (_store, _gateway, handler) = setup(trialing("u1", 3));
        let mut command = cmd("u1");
        command.price_id = " ".to_string();

        let err = handler.handle(command).await.unwrap_err();

        assert!(matches!(err, EntitlementError::ValidationFailed { .. }));
    }
}
