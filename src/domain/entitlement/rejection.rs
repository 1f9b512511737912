//! Business rejections returned by trial and subscription operations.
//!
//! These are outcomes, not faults: the caller shows the message and the
//! record is left untouched.

use serde::Serialize;
use std::fmt;

use super::IneligibleReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "rejection")]
pub enum TrialRejection {
    UserNotFound,
    Ineligible { reason: IneligibleReason },
    NoTrialFound,
    NoActiveTrial,
    TrialExpired,
    ExtensionsDisabled,
    InvalidExtensionDays { max: u32 },
}

impl fmt::Display for TrialRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrialRejection::UserNotFound => f.write_str("user not found"),
            TrialRejection::Ineligible { reason } => write!(f, "{}", reason),
            TrialRejection::NoTrialFound => f.write_str("no trial found"),
            TrialRejection::NoActiveTrial => f.write_str("no active trial found"),
            TrialRejection::TrialExpired => f.write_str("trial already expired"),
            TrialRejection::ExtensionsDisabled => f.write_str("trial extensions are disabled"),
            TrialRejection::InvalidExtensionDays { max } => {
                write!(f, "extension days must be between 1 and {}", max)
            }
        }
    }
}

/// Rejections returned by subscription management operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "rejection")]
pub enum SubscriptionRejection {
    UserNotFound,
    NoSubscriptionFound,
    AlreadyCanceled,
    NotScheduledForCancellation,
}

impl fmt::Display for SubscriptionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionRejection::UserNotFound => f.write_str("user not found"),
            SubscriptionRejection::NoSubscriptionFound => f.write_str("no subscription found"),
            SubscriptionRejection::AlreadyCanceled => f.write_str("subscription already canceled"),
            SubscriptionRejection::NotScheduledForCancellation => {
                f.write_str("subscription is not scheduled for cancellation")
            }
        }
    }
}

impl From<IneligibleReason> for TrialRejection {
    fn from(reason: IneligibleReason) -> Self {
        TrialRejection::Ineligible { reason }
    }
}
