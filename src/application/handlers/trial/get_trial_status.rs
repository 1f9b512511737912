//! GetTrialStatusHandler - Query handler for a user's trial projection.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, TrialStatusView};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementRepository;

#[derive(Debug, Clone)]
pub struct GetTrialStatusQuery {
    pub user_id: UserId,
}

/// Read-only. `None` means the user never started a trial.
pub struct GetTrialStatusHandler {
    repository: Arc<dyn EntitlementRepository>,
}

impl GetTrialStatusHandler {
    pub fn new(repository: Arc<dyn EntitlementRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        query: GetTrialStatusQuery,
    ) -> Result<Option<TrialStatusView>, EntitlementError> {
        let record = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| EntitlementError::not_found(query.user_id.clone()))?;
        Ok(record.trial_status(Timestamp::now()))
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

    #[tokio::test]
    async fn reports_days_remaining_for_running_trial() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(user("u1"), "a@example.com", now.minus_days(2));
        record.start_trial(7, now.minus_days(2)).unwrap();
        store.seed(record).unwrap();

        let view = GetTrialStatusHandler::new(store)
            .handle(GetTrialStatusQuery { user_id: user("u1") })
            .await
            .unwrap()
            .unwrap();

        assert!(view.is_active);
        assert!(!view.has_expired);
        assert_eq!(view.days_remaining, 5);
    }

    #[tokio::test]
    async fn never_trialed_user_has_no_status() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        store
            .seed(EntitlementRecord::new(user("u1"), "a@example.com", Timestamp::now()))
            .unwrap();

        let view = GetTrialStatusHandler::new(store)
            .handle(GetTrialStatusQuery { user_id: user("u1") })
            .await
            .unwrap();

        assert!(view.is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let err = GetTrialStatusHandler::new(store)
            .handle(GetTrialStatusQuery { user_id: user("ghost") })
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::NotFound(_)));
    }
}
