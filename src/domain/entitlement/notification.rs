//! User-facing notifications decided by this core.
//!
//! Delivery is someone else's job; a [`Notification`] only captures what
//! should be said to whom.

use crate::domain::foundation::{Timestamp, UserId};
use serde::Serialize;

/// Kind of notification, stored as the `type` column of the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum NotificationKind {
    TrialReminder { days_left: u32 },
    TrialExpired,
    SubscriptionExpired,
    PaymentFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::TrialReminder { .. } => "trial_reminder",
            NotificationKind::TrialExpired => "trial_expired",
            NotificationKind::SubscriptionExpired => "subscription_expired",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: Timestamp,
}

impl Notification {
    pub fn trial_reminder(user_id: UserId, days_left: u32, now: Timestamp) -> Self {
        let message = if days_left == 1 {
            "Your free trial expires tomorrow! Upgrade now to continue using premium features."
                .to_string()
        } else {
            format!(
                "Your free trial expires in {} days. Upgrade now to continue using premium features.",
                days_left
            )
        };
        Self {
            user_id,
            kind: NotificationKind::TrialReminder { days_left },
            title: "Trial Expiring Soon".to_string(),
            message,
            created_at: now,
        }
    }

    pub fn trial_expired(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            kind: NotificationKind::TrialExpired,
            title: "Trial Expired".to_string(),
            message: "Your free trial has expired. Upgrade to premium to continue using all features."
                .to_string(),
            created_at: now,
        }
    }

    pub fn subscription_expired(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            kind: NotificationKind::SubscriptionExpired,
            title: "Subscription Expired".to_string(),
            message: "Your premium subscription has expired. Upgrade to continue using premium features."
                .to_string(),
            created_at: now,
        }
    }

    pub fn payment_failed(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            kind: NotificationKind::PaymentFailed,
            title: "Payment Failed".to_string(),
            message: "Your payment could not be processed. Please update your payment method."
                .to_string(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("user-1").unwrap()
    }

    #[test]
    fn reminder_one_day_says_tomorrow() {
        let n = Notification::trial_reminder(user(), 1, Timestamp::now());
        assert!(n.message.contains("expires tomorrow"));
        assert_eq!(n.kind, NotificationKind::TrialReminder { days_left: 1 });
    }

    #[test]
    fn reminder_several_days_counts_them() {
        let n = Notification::trial_reminder(user(), 7, Timestamp::now());
        assert!(n.message.contains("expires in 7 days"));
    }

    #[test]
    fn kinds_have_stable_type_strings() {
        let now = Timestamp::now();
        assert_eq!(Notification::trial_expired(user(), now).kind.as_str(), "trial_expired");
        assert_eq!(
            Notification::subscription_expired(user(), now).kind.as_str(),
            "subscription_expired"
        );
        assert_eq!(Notification::payment_failed(user(), now).kind.as_str(), "payment_failed");
    }
}
