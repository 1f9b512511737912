//! PostgreSQL implementation of WebhookEventRepository.
//!
//! The event-log insert and the entitlement change share one transaction,
//! so an event id is only ever recorded together with its effect.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{
    CommitOutcome, EntitlementChange, WebhookDisposition, WebhookEventRecord,
    WebhookEventRepository,
};

use super::entitlement_repository::{apply_change, db_error};

pub struct PostgresWebhookEventRepository {
    pool: PgPool,
}

impl PostgresWebhookEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WebhookEventRow {
    event_id: String,
    event_type: String,
    received_at: DateTime<Utc>,
    disposition: String,
    note: Option<String>,
}

impl TryFrom<WebhookEventRow> for WebhookEventRecord {
    type Error = DomainError;

    fn try_from(row: WebhookEventRow) -> Result<Self, Self::Error> {
        let disposition = match row.disposition.as_str() {
            "applied" => WebhookDisposition::Applied,
            "ignored" => WebhookDisposition::Ignored,
            other => {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Invalid disposition value: {}", other),
                ))
            }
        };
        Ok(WebhookEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            received_at: Timestamp::from_datetime(row.received_at),
            disposition,
            note: row.note,
        })
    }
}

#[async_trait]
impl WebhookEventRepository for PostgresWebhookEventRepository {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        let row: Option<WebhookEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, received_at, disposition, note
            FROM webhook_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("fetch webhook event"))?;

        row.map(WebhookEventRecord::try_from).transpose()
    }

    async fn commit_event(
        &self,
        event: WebhookEventRecord,
        change: Option<EntitlementChange>,
    ) -> Result<CommitOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, received_at, disposition, note)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(*event.received_at.as_datetime())
        .bind(event.disposition.as_str())
        .bind(&event.note)
        .execute(&mut *tx)
        .await
        .map_err(db_error("insert webhook event"))?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await.map_err(db_error("roll back webhook event"))?;
            return Ok(CommitOutcome::DuplicateEvent);
        }

        if let Some(change) = change {
            let outcome = apply_change(&mut tx, &change).await?;
            if outcome != CommitOutcome::Committed {
                tx.rollback().await.map_err(db_error("roll back webhook event"))?;
                return Ok(outcome);
            }
        }

        tx.commit().await.map_err(db_error("commit webhook event"))?;
        Ok(CommitOutcome::Committed)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(*cutoff.as_datetime())
            .execute(&self.pool)
            .await
            .map_err(db_error("prune webhook events"))?;
        Ok(result.rows_affected())
    }
}
