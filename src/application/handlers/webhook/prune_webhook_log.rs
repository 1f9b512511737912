//! PruneWebhookLogHandler - Deletes old idempotency rows.

use std::sync::Arc;

use crate::domain::entitlement::EntitlementError;
use crate::domain::foundation::Timestamp;
use crate::ports::WebhookEventRepository;

#[derive(Debug, Clone, Copy)]
pub struct PruneWebhookLogCommand {
    /// Rows received more than this many days ago are deleted.
    pub older_than_days: u32,
}

/// Keeps the webhook log bounded. The retention must exceed the gateway's
/// redelivery window or replays older than it would be applied again.
pub struct PruneWebhookLogHandler {
    webhook_events: Arc<dyn WebhookEventRepository>,
}

impl PruneWebhookLogHandler {
    pub fn new(webhook_events: Arc<dyn WebhookEventRepository>) -> Self {
        Self { webhook_events }
    }

    pub async fn handle(&self, cmd: PruneWebhookLogCommand) -> Result<u64, EntitlementError> {
        let cutoff = Timestamp::now().minus_days(i64::from(cmd.older_than_days));
        let deleted = self.webhook_events.delete_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, older_than_days = cmd.older_than_days, "Pruned webhook log");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;
    use crate::ports::WebhookEventRecord;

    #[tokio::test]
    async fn deletes_only_rows_past_retention() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let now = Timestamp::now();
        store
            .commit_event(WebhookEventRecord::applied("evt_old", "x", now.minus_days(40)), None)
            .await
            .unwrap();
        store
            .commit_event(WebhookEventRecord::applied("evt_new", "x", now.minus_days(2)), None)
            .await
            .unwrap();

        let deleted = PruneWebhookLogHandler::new(store.clone())
            .handle(PruneWebhookLogCommand { older_than_days: 30 })
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.find_by_event_id("evt_old").await.unwrap().is_none());
        assert!(store.find_by_event_id("evt_new").await.unwrap().is_some());
    }
}
