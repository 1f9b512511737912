//! Webhook ingestion and log maintenance.

mod ingest_webhook;
mod prune_webhook_log;

pub use ingest_webhook::{IngestWebhookCommand, IngestWebhookHandler, IngestWebhookResult};
pub use prune_webhook_log::{PruneWebhookLogCommand, PruneWebhookLogHandler};
