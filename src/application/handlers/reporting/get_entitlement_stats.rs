//! GetEntitlementStatsHandler - Query handler for operational counters.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::entitlement::EntitlementError;
use crate::ports::{EntitlementReader, EntitlementStatistics};

/// Counters plus the derived trial conversion rate (percent).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitlementStatsView {
    #[serde(flatten)]
    pub counts: EntitlementStatistics,
    pub conversion_rate: f64,
}

pub struct GetEntitlementStatsHandler {
    reader: Arc<dyn EntitlementReader>,
}

impl GetEntitlementStatsHandler {
    pub fn new(reader: Arc<dyn EntitlementReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(&self) -> Result<EntitlementStatsView, EntitlementError> {
        let counts = self.reader.statistics().await?;
        let conversion_rate = counts.conversion_rate();
        Ok(EntitlementStatsView {
            counts,
            conversion_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::domain::entitlement::{EntitlementRecord, SubscriptionStatus};
    use crate::domain::foundation::{Timestamp, UserId};

    #[tokio::test]
    async fn reports_conversion_rate() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut converted = EntitlementRecord::new(UserId::new("u1").unwrap(), "a@example.com", now);
        converted.start_trial(7, now).unwrap();
        converted.apply_subscription_snapshot(
            SubscriptionStatus::Active,
            Some(now.add_days(30)),
            "sub_1",
            None,
            now,
        );
        let mut trialing = EntitlementRecord::new(UserId::new("u2").unwrap(), "b@example.com", now);
        trialing.start_trial(7, now).unwrap();
        store.seed(converted).unwrap();
        store.seed(trialing).unwrap();

        let view = GetEntitlementStatsHandler::new(store).handle().await.unwrap();

        assert_eq!(view.counts.total_records, 2);
        assert_eq!(view.counts.premium, 2);
        assert_eq!(view.conversion_rate, 50.0);
        // 30 days to the paid period end, 7 days of trial
        assert_eq!(view.counts.average_trial_duration_days, 18.5);
    }

    #[tokio::test]
    async fn canceled_subscription_after_conversion_is_not_a_converted_trial() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        let mut record = EntitlementRecord::new(UserId::new("u1").unwrap(), "a@example.com", now);
        record.start_trial(7, now).unwrap();
        record.attach_gateway_subscription("cus_1", "sub_1", now);
        record.mark_canceled(now);
        store.seed(record).unwrap();

        let view = GetEntitlementStatsHandler::new(store).handle().await.unwrap();

        assert_eq!(view.counts.trials_started, 1);
        assert_eq!(view.counts.converted_trials, 0);
        assert_eq!(view.counts.canceled, 1);
        assert_eq!(view.conversion_rate, 0.0);
    }
}
