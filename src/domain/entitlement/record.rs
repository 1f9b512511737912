//! Entitlement record.
//!
//! One record per user; the unit of truth for "does this user get premium".
//!
//! # Invariants
//!
//! - `is_premium` always equals [`EntitlementRecord::premium_for`] of the
//!   stored status and expiry at the moment of the last mutation. Every
//!   mutating method re-derives it; nothing sets it directly.
//! - `has_used_trial` never goes from `true` back to `false`.
//! - `version` is bumped by the store on every committed write and is the
//!   compare-and-swap token for concurrent writers.

use crate::domain::foundation::{
    DomainError, ErrorCode, StateMachine, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Per-user entitlement state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    pub user_id: UserId,

    /// Normalized (trimmed, lower-cased) email; secondary eligibility key.
    pub email: String,

    /// Cached projection of `subscription_status` and `expires_at`.
    pub is_premium: bool,

    pub subscription_status: SubscriptionStatus,

    /// End of the current paid period or trial period.
    pub expires_at: Option<Timestamp>,

    pub has_used_trial: bool,
    pub trial_start_date: Option<Timestamp>,
    pub trial_end_date: Option<Timestamp>,

    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    /// The paid subscription ends when the current period does.
    pub cancel_at_period_end: bool,

    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Before/after summary of a mutation, used for audit rows and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SubscriptionStatus,
    pub to: SubscriptionStatus,
    pub was_premium: bool,
    pub is_premium: bool,
}

impl Transition {
    /// Neither status nor premium flag moved.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.was_premium == self.is_premium
    }

    pub fn lost_premium(&self) -> bool {
        self.was_premium && !self.is_premium
    }

    pub fn gained_premium(&self) -> bool {
        !self.was_premium && self.is_premium
    }
}

/// Read-only projection of a user's trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialStatusView {
    /// Trial is in progress and has not run out.
    pub is_active: bool,
    pub trial_start_date: Option<Timestamp>,
    pub trial_end_date: Timestamp,
    /// Whole days left, rounded up; 0 once expired.
    pub days_remaining: i64,
    pub has_expired: bool,
}

/// Lower-cases and trims an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl EntitlementRecord {
    /// Creates the default record for a user seen for the first time.
    pub fn new(user_id: UserId, email: &str, now: Timestamp) -> Self {
        Self {
            user_id,
            email: normalize_email(email),
            is_premium: false,
            subscription_status: SubscriptionStatus::None,
            expires_at: None,
            has_used_trial: false,
            trial_start_date: None,
            trial_end_date: None,
            gateway_customer_id: None,
            gateway_subscription_id: None,
            cancel_at_period_end: false,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Premium derivation shared by every mutation and by the sweeps.
    pub fn premium_for(
        status: SubscriptionStatus,
        expires_at: Option<Timestamp>,
        now: Timestamp,
    ) -> bool {
        status.grants_premium() && expires_at.map_or(true, |expiry| expiry.is_after(&now))
    }

    /// What `is_premium` should be at `now`.
    pub fn derived_premium(&self, now: Timestamp) -> bool {
        Self::premium_for(self.subscription_status, self.expires_at, now)
    }

    /// True when the cached flag agrees with the derivation at `now`.
    pub fn is_consistent(&self, now: Timestamp) -> bool {
        self.is_premium == self.derived_premium(now)
    }

    /// True when the stored expiry is at or before `now`.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        self.expires_at.map_or(false, |expiry| !expiry.is_after(&now))
    }

    /// Starts a trial of `duration_days`, returning the trial end date.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the trial was already used or
    /// the current status cannot start a trial.
    pub fn start_trial(
        &mut self,
        duration_days: u32,
        now: Timestamp,
    ) -> Result<Timestamp, DomainError> {
        if self.has_used_trial {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                "Trial has already been used for this account",
            ));
        }
        self.subscription_status = self.checked_transition(SubscriptionStatus::Trialing)?;

        let trial_end = now.add_days(i64::from(duration_days));
        self.trial_start_date = Some(now);
        self.trial_end_date = Some(trial_end);
        self.expires_at = Some(trial_end);
        self.has_used_trial = true;
        self.refresh(now);

        Ok(trial_end)
    }

    /// Pushes the end of a running trial out by `additional_days`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if there is no trial in progress.
    pub fn extend_trial(
        &mut self,
        additional_days: u32,
        now: Timestamp,
    ) -> Result<Timestamp, DomainError> {
        let trial_end = match (self.subscription_status, self.trial_end_date) {
            (SubscriptionStatus::Trialing, Some(end)) => end,
            _ => {
                return Err(DomainError::new(
                    ErrorCode::InvalidStateTransition,
                    "No active trial found",
                ))
            }
        };

        let days = i64::from(additional_days);
        let new_end = trial_end.add_days(days);
        self.trial_end_date = Some(new_end);
        self.expires_at = Some(self.expires_at.map_or(new_end, |expiry| expiry.add_days(days)));
        self.refresh(now);

        Ok(new_end)
    }

    /// Records the gateway references produced by converting a trial.
    ///
    /// The status is left alone; the gateway's subscription event settles it.
    pub fn attach_gateway_subscription(
        &mut self,
        customer_id: &str,
        subscription_id: &str,
        now: Timestamp,
    ) {
        self.gateway_customer_id = Some(customer_id.to_string());
        self.gateway_subscription_id = Some(subscription_id.to_string());
        self.refresh(now);
    }

    /// Mirrors a subscription snapshot reported by the gateway.
    pub fn apply_subscription_snapshot(
        &mut self,
        status: SubscriptionStatus,
        period_end: Option<Timestamp>,
        subscription_id: &str,
        customer_id: Option<&str>,
        now: Timestamp,
    ) -> Transition {
        let before = self.snapshot();
        self.subscription_status = status;
        if period_end.is_some() {
            self.expires_at = period_end;
        }
        self.gateway_subscription_id = Some(subscription_id.to_string());
        if let Some(customer_id) = customer_id {
            self.gateway_customer_id = Some(customer_id.to_string());
        }
        self.refresh(now);
        self.transition_since(before)
    }

    /// Applies a gateway cancellation; premium ends immediately.
    pub fn mark_canceled(&mut self, now: Timestamp) -> Transition {
        let before = self.snapshot();
        self.subscription_status = SubscriptionStatus::Canceled;
        self.cancel_at_period_end = false;
        self.refresh(now);
        self.transition_since(before)
    }

    /// Records whether the paid subscription stops renewing. Access is
    /// untouched until the period ends.
    pub fn set_cancel_at_period_end(&mut self, cancel: bool, now: Timestamp) {
        self.cancel_at_period_end = cancel;
        self.refresh(now);
    }

    /// Re-derives state from the canonical fields.
    ///
    /// A trial or paid period that has run out moves to `trial_expired` or
    /// `expired`; in every case `is_premium` is recomputed.
    pub fn reconcile(&mut self, now: Timestamp) -> Transition {
        let before = self.snapshot();
        if self.has_lapsed(now) {
            let target = match self.subscription_status {
                SubscriptionStatus::Trialing => Some(SubscriptionStatus::TrialExpired),
                SubscriptionStatus::Active => Some(SubscriptionStatus::Expired),
                _ => None,
            };
            if let Some(target) = target {
                if self.subscription_status.can_transition_to(&target) {
                    self.subscription_status = target;
                }
            }
        }
        if self.subscription_status != before.0 || !self.is_consistent(now) {
            self.refresh(now);
        }
        self.transition_since(before)
    }

    /// Trial projection, `None` if the user never started a trial.
    pub fn trial_status(&self, now: Timestamp) -> Option<TrialStatusView> {
        let trial_end = self.trial_end_date?;
        let has_expired = now.is_after(&trial_end);
        let remaining_ms = trial_end.duration_since(&now).num_milliseconds();
        let days_remaining = if has_expired || remaining_ms <= 0 {
            0
        } else {
            (remaining_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
        };

        Some(TrialStatusView {
            is_active: self.subscription_status == SubscriptionStatus::Trialing && !has_expired,
            trial_start_date: self.trial_start_date,
            trial_end_date: trial_end,
            days_remaining,
            has_expired,
        })
    }

    fn checked_transition(
        &self,
        target: SubscriptionStatus,
    ) -> Result<SubscriptionStatus, DomainError> {
        self.subscription_status
            .transition_to(target)
            .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))
    }

    fn snapshot(&self) -> (SubscriptionStatus, bool) {
        (self.subscription_status, self.is_premium)
    }

    fn transition_since(&self, before: (SubscriptionStatus, bool)) -> Transition {
        Transition {
            from: before.0,
            to: self.subscription_status,
            was_premium: before.1,
            is_premium: self.is_premium,
        }
    }

    fn refresh(&mut self, now: Timestamp) {
        self.is_premium = self.derived_premium(now);
        self.updated_at = now;
    }
}
