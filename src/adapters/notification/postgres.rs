use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entitlement::{Notification, NotificationKind};
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::Notifier;

/// Enqueues notifications in the `notifications` table for a delivery worker.
#[derive(Clone)]
pub struct PostgresNotifier {
    pool: PgPool,
}

impl PostgresNotifier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn payload(kind: &NotificationKind) -> serde_json::Value {
    match kind {
        NotificationKind::TrialReminder { days_left } => {
            serde_json::json!({ "days_left": days_left })
        }
        _ => serde_json::Value::Null,
    }
}

#[async_trait]
impl Notifier for PostgresNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (user_id, type, title, message, data, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6)
            "#,
        )
        .bind(notification.user_id.as_str())
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(payload(&notification.kind))
        .bind(notification.created_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to enqueue notification: {}", e),
            )
        })?;
        Ok(())
    }
}
