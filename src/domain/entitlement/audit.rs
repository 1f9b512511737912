//! Audit/sync trail entries.

use crate::domain::foundation::{EntryId, Timestamp, UserId, ValidationError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::{SubscriptionStatus, Transition};

/// Why an entitlement row was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCause {
    Started,
    Extended,
    Converted,
    GatewaySync,
    Canceled,
    /// Subscription set to end with the current period.
    CancelScheduled,
    /// A scheduled cancellation was withdrawn.
    Reactivated,
    TrialExpired,
    Downgraded,
    Upgraded,
    /// Trial reminder sent for the given lead time in days.
    ReminderSent(u32),
}

impl AuditCause {
    /// Stable storage code, e.g. `started` or `reminder_sent:7`.
    pub fn code(&self) -> String {
        match self {
            AuditCause::Started => "started".to_string(),
            AuditCause::Extended => "extended".to_string(),
            AuditCause::Converted => "converted".to_string(),
            AuditCause::GatewaySync => "gateway_sync".to_string(),
            AuditCause::Canceled => "canceled".to_string(),
            AuditCause::CancelScheduled => "cancel_scheduled".to_string(),
            AuditCause::Reactivated => "reactivated".to_string(),
            AuditCause::TrialExpired => "trial_expired".to_string(),
            AuditCause::Downgraded => "downgraded".to_string(),
            AuditCause::Upgraded => "upgraded".to_string(),
            AuditCause::ReminderSent(days) => format!("reminder_sent:{}", days),
        }
    }
}

impl fmt::Display for AuditCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl FromStr for AuditCause {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(days) = s.strip_prefix("reminder_sent:") {
            return days
                .parse()
                .map(AuditCause::ReminderSent)
                .map_err(|_| ValidationError::invalid_format("audit_cause", s));
        }
        match s {
            "started" => Ok(AuditCause::Started),
            "extended" => Ok(AuditCause::Extended),
            "converted" => Ok(AuditCause::Converted),
            "gateway_sync" => Ok(AuditCause::GatewaySync),
            "canceled" => Ok(AuditCause::Canceled),
            "cancel_scheduled" => Ok(AuditCause::CancelScheduled),
            "reactivated" => Ok(AuditCause::Reactivated),
            "trial_expired" => Ok(AuditCause::TrialExpired),
            "downgraded" => Ok(AuditCause::Downgraded),
            "upgraded" => Ok(AuditCause::Upgraded),
            other => Err(ValidationError::invalid_format(
                "audit_cause",
                format!("unknown cause '{}'", other),
            )),
        }
    }
}

/// One append-only row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub from_state: SubscriptionStatus,
    pub to_state: SubscriptionStatus,
    pub cause: AuditCause,
    /// Free-form context (event id, new dates, ...).
    pub detail: serde_json::Value,
    pub occurred_at: Timestamp,
}

impl AuditEntry {
    pub fn new(
        user_id: UserId,
        from_state: SubscriptionStatus,
        to_state: SubscriptionStatus,
        cause: AuditCause,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id,
            from_state,
            to_state,
            cause,
            detail: serde_json::Value::Null,
            occurred_at,
        }
    }

    pub fn for_transition(
        user_id: UserId,
        transition: &Transition,
        cause: AuditCause,
        occurred_at: Timestamp,
    ) -> Self {
        Self::new(user_id, transition.from, transition.to, cause, occurred_at)
            .with_detail("was_premium", transition.was_premium)
            .with_detail("is_premium", transition.is_premium)
    }

    /// Adds a key to the detail object.
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if !self.detail.is_object() {
            self.detail = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(map) = &mut self.detail {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}
