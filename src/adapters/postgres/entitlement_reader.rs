//! PostgreSQL implementation of EntitlementReader.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{PaymentLogEntry, PaymentStatus};
use crate::domain::entitlement::{normalize_email, AuditEntry, EntitlementRecord};
use crate::domain::foundation::{DeviceId, DomainError, EntryId, ErrorCode, Timestamp, UserId};
use crate::ports::{EntitlementReader, EntitlementStatistics};

use super::entitlement_repository::{db_error, EntitlementRow, RECORD_COLUMNS};

pub struct PostgresEntitlementReader {
    pool: PgPool,
}

impl PostgresEntitlementReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_ids(&self, sql: &str, now: Option<Timestamp>) -> Result<Vec<UserId>, DomainError> {
        let mut query = sqlx::query_as::<_, (String,)>(sql);
        if let Some(now) = now {
            query = query.bind(*now.as_datetime());
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("select candidates"))?;
        rows.into_iter()
            .map(|(id,)| UserId::new(id).map_err(invalid("user_id")))
            .collect()
    }
}

fn invalid<E: std::fmt::Display>(field: &'static str) -> impl Fn(E) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Invalid {}: {}", field, e))
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: String,
    from_state: String,
    to_state: String,
    cause: String,
    detail: serde_json::Value,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DomainError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditEntry {
            id: EntryId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(invalid("user_id"))?,
            from_state: row.from_state.parse().map_err(invalid("from_state"))?,
            to_state: row.to_state.parse().map_err(invalid("to_state"))?,
            cause: row.cause.parse().map_err(invalid("cause"))?,
            detail: row.detail,
            occurred_at: Timestamp::from_datetime(row.occurred_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: String,
    invoice_id: String,
    subscription_id: Option<String>,
    amount_cents: i64,
    currency: String,
    status: String,
    recorded_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for PaymentLogEntry {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(PaymentLogEntry {
            id: EntryId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(invalid("user_id"))?,
            invoice_id: row.invoice_id,
            subscription_id: row.subscription_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status.parse::<PaymentStatus>().map_err(invalid("status"))?,
            recorded_at: Timestamp::from_datetime(row.recorded_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatisticsRow {
    total_records: i64,
    premium: i64,
    trialing: i64,
    active: i64,
    canceled: i64,
    expired: i64,
    trials_started: i64,
    converted_trials: i64,
    average_trial_duration_days: f64,
}

impl From<StatisticsRow> for EntitlementStatistics {
    fn from(row: StatisticsRow) -> Self {
        let count = |n: i64| u64::try_from(n).unwrap_or(0);
        EntitlementStatistics {
            total_records: count(row.total_records),
            premium: count(row.premium),
            trialing: count(row.trialing),
            active: count(row.active),
            canceled: count(row.canceled),
            expired: count(row.expired),
            trials_started: count(row.trials_started),
            converted_trials: count(row.converted_trials),
            average_trial_duration_days: row.average_trial_duration_days,
        }
    }
}

#[async_trait]
impl EntitlementReader for PostgresEntitlementReader {
    async fn count_used_trials_by_email(&self, email: &str) -> Result<u32, DomainError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM entitlements WHERE email = $1 AND has_used_trial",
        )
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count trials by email"))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn count_device_bindings(&self, device_id: &DeviceId) -> Result<u32, DomainError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM trial_device_bindings WHERE device_id = $1")
                .bind(device_id.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count device bindings"))?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn find_downgrade_candidates(&self, now: Timestamp) -> Result<Vec<UserId>, DomainError> {
        self.user_ids(
            r#"
            SELECT user_id FROM entitlements
            WHERE is_premium
              AND ((expires_at IS NOT NULL AND expires_at < $1)
                   OR subscription_status IN ('canceled', 'incomplete_expired', 'unpaid'))
            ORDER BY user_id
            "#,
            Some(now),
        )
        .await
    }

    async fn find_trials_ending_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<EntitlementRecord>, DomainError> {
        let sql = format!(
            "SELECT {} FROM entitlements \
             WHERE subscription_status = 'trialing' \
               AND trial_end_date >= $1 AND trial_end_date < $2 \
             ORDER BY user_id",
            RECORD_COLUMNS
        );
        let rows: Vec<EntitlementRow> = sqlx::query_as(&sql)
            .bind(*start.as_datetime())
            .bind(*end.as_datetime())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("select trials ending"))?;
        rows.into_iter().map(EntitlementRecord::try_from).collect()
    }

    async fn find_audit_candidates(&self) -> Result<Vec<UserId>, DomainError> {
        self.user_ids(
            r#"
            SELECT user_id FROM entitlements
            WHERE is_premium OR gateway_subscription_id IS NOT NULL
            ORDER BY user_id
            "#,
            None,
        )
        .await
    }

    async fn audit_trail(&self, user_id: &UserId) -> Result<Vec<AuditEntry>, DomainError> {
        let rows: Vec<AuditRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, from_state, to_state, cause, detail, occurred_at
            FROM entitlement_audit
            WHERE user_id = $1
            ORDER BY occurred_at
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch audit trail"))?;
        rows.into_iter().map(AuditEntry::try_from).collect()
    }

    async fn payment_history(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PaymentLogEntry>, DomainError> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, invoice_id, subscription_id, amount_cents, currency, status, recorded_at
            FROM payment_log
            WHERE user_id = $1
            ORDER BY recorded_at
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("fetch payment history"))?;
        rows.into_iter().map(PaymentLogEntry::try_from).collect()
    }

    async fn statistics(&self) -> Result<EntitlementStatistics, DomainError> {
        let row: StatisticsRow = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) AS total_records,
                COUNT(*) FILTER (WHERE is_premium) AS premium,
                COUNT(*) FILTER (WHERE subscription_status = 'trialing') AS trialing,
                COUNT(*) FILTER (WHERE subscription_status = 'active') AS active,
                COUNT(*) FILTER (WHERE subscription_status = 'canceled') AS canceled,
                COUNT(*) FILTER (WHERE subscription_status IN ('expired', 'trial_expired')) AS expired,
                COUNT(*) FILTER (WHERE has_used_trial) AS trials_started,
                COUNT(*) FILTER (WHERE has_used_trial AND subscription_status = 'active')
                    AS converted_trials,
                COALESCE(
                    AVG(DATE_PART('day', COALESCE(expires_at, NOW()) - trial_start_date))
                        FILTER (WHERE has_used_trial AND trial_start_date IS NOT NULL),
                    0
                )::DOUBLE PRECISION AS average_trial_duration_days
            FROM entitlements
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("compute statistics"))?;
        Ok(row.into())
    }
}
