//! Subscription status state machine.
//!
//! The status is the canonical entitlement state. Local operations (trial
//! start, sweep corrections) must follow the [`StateMachine`] rules; statuses
//! reported by the payment gateway are mirrored as-is because the gateway is
//! authoritative for paid subscriptions.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription status of an entitlement record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Never trialed, never subscribed.
    #[default]
    None,

    /// Free trial in progress.
    Trialing,

    /// Paid subscription in good standing.
    Active,

    /// Subscription canceled at the gateway.
    Canceled,

    /// Trial ran out without conversion.
    TrialExpired,

    /// Paid period lapsed without renewal.
    Expired,

    // Statuses below are only ever set from gateway snapshots.
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
}

impl SubscriptionStatus {
    /// Returns true if this status can grant premium access.
    ///
    /// Access additionally requires that `expires_at` has not passed.
    pub fn grants_premium(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    /// Returns true for statuses the downgrade sweep always re-examines,
    /// regardless of the stored expiry.
    pub fn is_lapsed(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled
                | SubscriptionStatus::IncompleteExpired
                | SubscriptionStatus::Unpaid
        )
    }

    /// Parses a status string as reported by the payment gateway.
    ///
    /// Only gateway vocabulary is accepted; `none`, `trial_expired` and
    /// `expired` are local states the gateway never reports.
    pub fn from_gateway(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "canceled" => Some(SubscriptionStatus::Canceled),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            "incomplete" => Some(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Some(SubscriptionStatus::IncompleteExpired),
            "paused" => Some(SubscriptionStatus::Paused),
            _ => None,
        }
    }

    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::None => "none",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::TrialExpired => "trial_expired",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Paused => "paused",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SubscriptionStatus::None),
            "trial_expired" => Ok(SubscriptionStatus::TrialExpired),
            "expired" => Ok(SubscriptionStatus::Expired),
            other => SubscriptionStatus::from_gateway(other).ok_or_else(|| {
                ValidationError::invalid_format(
                    "subscription_status",
                    format!("unknown status '{}'", other),
                )
            }),
        }
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // Trial start from any non-granting status; eligibility rules
            // decide whether it is allowed
            (
                None | Canceled | Expired | PastDue | Unpaid | Incomplete | IncompleteExpired
                    | Paused,
                Trialing
            )
            // Sweep corrections
                | (Trialing, TrialExpired)
                | (Active, Expired)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            None | Canceled | Expired | PastDue | Unpaid | Incomplete | IncompleteExpired
            | Paused => vec![Trialing],
            Trialing => vec![TrialExpired],
            Active => vec![Expired],
            TrialExpired => vec![],
        }
    }
}
