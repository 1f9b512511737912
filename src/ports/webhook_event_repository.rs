//! WebhookEventRepository port - idempotency log for gateway webhooks.
//!
//! The gateway delivers at least once. A row per event id is the guard:
//! it is written in the same atomic unit as the mutation it caused, so the
//! log and the entitlement state can never disagree.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, Timestamp};

use super::{CommitOutcome, EntitlementChange};

/// How an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    Applied,
    Ignored,
}

impl WebhookDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookDisposition::Applied => "applied",
            WebhookDisposition::Ignored => "ignored",
        }
    }
}

/// Record of a processed webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEventRecord {
    /// Gateway event ID (evt_xxx format).
    pub event_id: String,
    pub event_type: String,
    pub received_at: Timestamp,
    pub disposition: WebhookDisposition,
    /// Why the event was ignored, if it was.
    pub note: Option<String>,
}

impl WebhookEventRecord {
    pub fn applied(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        received_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            received_at,
            disposition: WebhookDisposition::Applied,
            note: None,
        }
    }

    pub fn ignored(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        reason: impl Into<String>,
        received_at: Timestamp,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            received_at,
            disposition: WebhookDisposition::Ignored,
            note: Some(reason.into()),
        }
    }
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    /// Returns `None` if the event hasn't been processed yet.
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError>;

    /// Atomically insert `event` together with the optional entitlement change.
    ///
    /// Returns `DuplicateEvent` if the event id is already logged and
    /// `VersionConflict` if the record moved since it was read; in both
    /// cases nothing is written.
    async fn commit_event(
        &self,
        event: WebhookEventRecord,
        change: Option<EntitlementChange>,
    ) -> Result<CommitOutcome, DomainError>;

    /// Delete records received before `cutoff`. Returns the number deleted.
    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_record_keeps_reason() {
        let record = WebhookEventRecord::ignored(
            "evt_1",
            "customer.created",
            "unhandled event type",
            Timestamp::now(),
        );
        assert_eq!(record.disposition, WebhookDisposition::Ignored);
        assert_eq!(record.note.as_deref(), Some("unhandled event type"));
    }

    #[test]
    fn disposition_strings() {
        assert_eq!(WebhookDisposition::Applied.as_str(), "applied");
        assert_eq!(WebhookDisposition::Ignored.as_str(), "ignored");
    }

    #[test]
    fn webhook_event_repository_is_object_safe() {
        fn _accepts(_repo: &dyn WebhookEventRepository) {}
    }
}
