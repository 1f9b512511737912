//! CheckEligibilityHandler - Query handler for trial eligibility.

use std::sync::Arc;

use crate::domain::entitlement::{
    Eligibility, EligibilityPolicy, EntitlementError, EntitlementRecord,
};
use crate::domain::foundation::{DeviceId, DomainError, UserId};
use crate::ports::{EntitlementReader, EntitlementRepository};

/// Query to check whether a user may start a trial.
#[derive(Debug, Clone)]
pub struct CheckEligibilityQuery {
    pub user_id: UserId,
    pub device_id: Option<DeviceId>,
}

/// Runs the eligibility rules in order, stopping at the first failure.
///
/// Counts are only fetched when the earlier rules pass.
pub(crate) async fn evaluate_eligibility(
    reader: &dyn EntitlementReader,
    policy: &EligibilityPolicy,
    record: &EntitlementRecord,
    device_id: Option<&DeviceId>,
) -> Result<Eligibility, DomainError> {
    let account = policy.check_account(record);
    if !account.is_eligible() {
        return Ok(account);
    }

    let used = reader.count_used_trials_by_email(&record.email).await?;
    let email = policy.check_email(used);
    if !email.is_eligible() {
        return Ok(email);
    }

    match device_id {
        Some(device_id) => {
            let bindings = reader.count_device_bindings(device_id).await?;
            Ok(policy.check_device(bindings))
        }
        None => Ok(Eligibility::Eligible),
    }
}

/// Handler for trial eligibility checks. Read-only.
pub struct CheckEligibilityHandler {
    repository: Arc<dyn EntitlementRepository>,
    reader: Arc<dyn EntitlementReader>,
    policy: EligibilityPolicy,
}

impl CheckEligibilityHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        reader: Arc<dyn EntitlementReader>,
        policy: EligibilityPolicy,
    ) -> Self {
        Self {
            repository,
            reader,
            policy,
        }
    }

    pub async fn handle(&self, query: CheckEligibilityQuery) -> Result<Eligibility, EntitlementError> {
        let record = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| EntitlementError::not_found(query.user_id.clone()))?;

        let eligibility =
            evaluate_eligibility(&*self.reader, &self.policy, &record, query.device_id.as_ref())
                .await?;

        if let Some(reason) = eligibility.reason() {
            tracing::debug!(user_id = %query.user_id, %reason, "User not eligible for trial");
        }
        Ok(eligibility)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::entitlement::{IneligibleReason, SubscriptionStatus, TrialDeviceBinding};
    use crate::domain::foundation::Timestamp;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn handler(store: Arc<InMemoryEntitlementStore>) -> CheckEligibilityHandler {
        CheckEligibilityHandler::new(store.clone(), store, EligibilityPolicy::default())
    }

    fn query(id: &str, device: Option<&str>) -> CheckEligibilityQuery {
        CheckEligibilityQuery {
            user_id: user(id),
            device_id: device.map(|d| DeviceId::new(d).unwrap()),
        }
    }

    #[tokio::test]
    async fn fresh_user_is_eligible() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store
            .seed(EntitlementRecord::new(user("u1"), "fresh@example.com", Timestamp::now()))
            .unwrap();

        let result = handler(store).handle(query("u1", Some("d1"))).await.unwrap();

        assert_eq!(result, Eligibility::Eligible);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let err = handler(store).handle(query("ghost", None)).await.unwrap_err();
        assert!(matches!(err, EntitlementError::NotFound(_)));
    }

    #[tokio::test]
    async fn account_rule_wins_over_device_rule() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(user("u1"), "a@example.com", now);
        record.subscription_status = SubscriptionStatus::Active;
        store.seed(record).unwrap();
        for id in ["x1", "x2", "x3"] {
            store
                .seed_device_binding(TrialDeviceBinding::new(DeviceId::new("d1").unwrap(), user(id), now))
                .unwrap();
        }

        let result = handler(store).handle(query("u1", Some("d1"))).await.unwrap();

        assert_eq!(result.reason(), Some(IneligibleReason::AlreadySubscribed));
    }

    #[tokio::test]
    async fn email_shared_with_used_trial_is_ineligible() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut other = EntitlementRecord::new(user("old"), "Shared@Example.com", now);
        other.has_used_trial = true;
        other.subscription_status = SubscriptionStatus::TrialExpired;
        store.seed(other).unwrap();
        store
            .seed(EntitlementRecord::new(user("new"), "shared@example.com", now))
            .unwrap();

        let result = handler(store).handle(query("new", None)).await.unwrap();

        assert_eq!(result.reason(), Some(IneligibleReason::EmailLimitReached));
    }

    #[tokio::test]
    async fn device_without_id_is_not_checked() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        store
            .seed(EntitlementRecord::new(user("u1"), "a@example.com", now))
            .unwrap();
        for id in ["x1", "x2", "x3"] {
            store
                .seed_device_binding(TrialDeviceBinding::new(DeviceId::new("d1").unwrap(), user(id), now))
                .unwrap();
        }

        let h = handler(store);
        assert!(h.handle(query("u1", None)).await.unwrap().is_eligible());
        assert_eq!(
            h.handle(query("u1", Some("d1"))).await.unwrap().reason(),
            Some(IneligibleReason::DeviceLimitReached)
        );
    }
}
