//! Subscription management handlers: cancel, reactivate and details.

mod cancel_subscription;
mod get_subscription_info;
mod reactivate_subscription;

pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionOutcome,
};
pub use get_subscription_info::{GetSubscriptionInfoHandler, GetSubscriptionInfoQuery};
pub use reactivate_subscription::{
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionOutcome,
};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::adapters::stripe::MockPaymentGateway;
    use crate::domain::billing::SubscriptionSnapshot;
    use crate::domain::entitlement::{EntitlementRecord, SubscriptionStatus};
    use crate::domain::foundation::{Timestamp, UserId};

    pub fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    /// A paying user whose subscription `sub_<id>` is known to the gateway.
    pub fn paid(id: &str, gateway: &MockPaymentGateway) -> EntitlementRecord {
        let now = Timestamp::now();
        let sub_id = format!("sub_{}", id);
        let period_end = now.add_days(20);
        let mut record = EntitlementRecord::new(user(id), "p@example.com", now.minus_days(40));
        record.start_trial(7, now.minus_days(40)).unwrap();
        record.apply_subscription_snapshot(
            SubscriptionStatus::Active,
            Some(period_end),
            &sub_id,
            Some("cus_1"),
            now.minus_days(10),
        );
        gateway.add_subscription(SubscriptionSnapshot {
            id: sub_id,
            customer_id: "cus_1".to_string(),
            status: SubscriptionStatus::Active,
            current_period_end: Some(period_end),
            cancel_at_period_end: false,
            user_id: Some(id.to_string()),
        });
        record
    }
}
