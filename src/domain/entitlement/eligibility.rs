//! Trial eligibility rules.
//!
//! Pure checks, evaluated in a fixed order where the first failing rule
//! wins. The caller gathers the counts; rules that need a count are split
//! out so the count is only fetched once the earlier rules have passed.

use serde::Serialize;
use std::fmt;

use super::{EntitlementRecord, SubscriptionStatus};

/// Why a user may not start a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    AlreadySubscribed,
    TrialAlreadyUsed,
    EmailLimitReached,
    DeviceLimitReached,
}

impl fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IneligibleReason::AlreadySubscribed => "already subscribed",
            IneligibleReason::TrialAlreadyUsed => "trial already used",
            IneligibleReason::EmailLimitReached => "email limit reached",
            IneligibleReason::DeviceLimitReached => "device limit reached",
        };
        f.write_str(s)
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "reason")]
pub enum Eligibility {
    Eligible,
    Ineligible(IneligibleReason),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible)
    }

    pub fn reason(&self) -> Option<IneligibleReason> {
        match self {
            Eligibility::Eligible => None,
            Eligibility::Ineligible(reason) => Some(*reason),
        }
    }
}

/// Configured abuse limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityPolicy {
    pub max_trials_per_email: u32,
    pub max_trials_per_device: u32,
}

impl Default for EligibilityPolicy {
    fn default() -> Self {
        Self {
            max_trials_per_email: 1,
            max_trials_per_device: 3,
        }
    }
}

impl EligibilityPolicy {
    /// Rules 1 and 2: current subscription and the account's own trial flag.
    pub fn check_account(&self, record: &EntitlementRecord) -> Eligibility {
        if matches!(
            record.subscription_status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        ) {
            return Eligibility::Ineligible(IneligibleReason::AlreadySubscribed);
        }
        if record.has_used_trial {
            return Eligibility::Ineligible(IneligibleReason::TrialAlreadyUsed);
        }
        Eligibility::Eligible
    }

    /// Rule 3: `used_trials_for_email` counts records with this email whose
    /// trial has been used.
    pub fn check_email(&self, used_trials_for_email: u32) -> Eligibility {
        if used_trials_for_email >= self.max_trials_per_email {
            Eligibility::Ineligible(IneligibleReason::EmailLimitReached)
        } else {
            Eligibility::Eligible
        }
    }

    /// Rule 4: `device_bindings` counts trials already started from the device.
    pub fn check_device(&self, device_bindings: u32) -> Eligibility {
        if device_bindings >= self.max_trials_per_device {
            Eligibility::Ineligible(IneligibleReason::DeviceLimitReached)
        } else {
            Eligibility::Eligible
        }
    }

    /// All rules at once, for callers that already hold every count.
    pub fn evaluate(
        &self,
        record: &EntitlementRecord,
        used_trials_for_email: u32,
        device_bindings: Option<u32>,
    ) -> Eligibility {
        let account = self.check_account(record);
        if !account.is_eligible() {
            return account;
        }
        let email = self.check_email(used_trials_for_email);
        if !email.is_eligible() {
            return email;
        }
        match device_bindings {
            Some(count) => self.check_device(count),
            None => Eligibility::Eligible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};

    fn record() -> EntitlementRecord {
        EntitlementRecord::new(UserId::new("u1").unwrap(), "a@b.c", Timestamp::now())
    }

    #[test]
    fn fresh_account_is_eligible() {
        let policy = EligibilityPolicy::default();
        assert_eq!(policy.evaluate(&record(), 0, Some(0)), Eligibility::Eligible);
        assert_eq!(policy.evaluate(&record(), 0, None), Eligibility::Eligible);
    }

    #[test]
    fn subscribed_account_is_rejected_first() {
        let policy = EligibilityPolicy::default();
        let record = EntitlementRecord {
            subscription_status: SubscriptionStatus::Trialing,
            has_used_trial: true,
            ..record()
        };
        assert_eq!(
            policy.evaluate(&record, 10, Some(10)).reason(),
            Some(IneligibleReason::AlreadySubscribed)
        );
    }

    #[test]
    fn used_trial_beats_email_limit() {
        let policy = EligibilityPolicy::default();
        let record = EntitlementRecord {
            subscription_status: SubscriptionStatus::TrialExpired,
            has_used_trial: true,
            ..record()
        };
        assert_eq!(
            policy.evaluate(&record, 5, None).reason(),
            Some(IneligibleReason::TrialAlreadyUsed)
        );
    }

    #[test]
    fn email_limit_boundary() {
        let policy = EligibilityPolicy {
            max_trials_per_email: 2,
            max_trials_per_device: 3,
        };
        assert!(policy.check_email(1).is_eligible());
        assert_eq!(
            policy.check_email(2).reason(),
            Some(IneligibleReason::EmailLimitReached)
        );
    }

    #[test]
    fn device_limit_boundary() {
        let policy = EligibilityPolicy::default();
        assert!(policy.check_device(2).is_eligible());
        assert_eq!(
            policy.check_device(3).reason(),
            Some(IneligibleReason::DeviceLimitReached)
        );
    }

    #[test]
    fn email_rule_runs_before_device_rule() {
        let policy = EligibilityPolicy::default();
        assert_eq!(
            policy.evaluate(&record(), 1, Some(3)).reason(),
            Some(IneligibleReason::EmailLimitReached)
        );
    }

    #[test]
    fn reasons_read_as_plain_english() {
        assert_eq!(IneligibleReason::AlreadySubscribed.to_string(), "already subscribed");
        assert_eq!(IneligibleReason::DeviceLimitReached.to_string(), "device limit reached");
    }
}
