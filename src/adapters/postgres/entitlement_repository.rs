//! PostgreSQL implementation of EntitlementRepository.
//!
//! Every commit runs in one transaction: the conditional update of the
//! record plus its audit, device-binding and payment rows.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::billing::PaymentLogEntry;
use crate::domain::entitlement::{AuditEntry, EntitlementRecord, TrialDeviceBinding};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{CommitOutcome, EntitlementChange, EntitlementRepository};

/// PostgreSQL implementation of the EntitlementRepository port.
pub struct PostgresEntitlementRepository {
    pool: PgPool,
}

impl PostgresEntitlementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        column: &'static str,
        value: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let sql = format!("SELECT {} FROM entitlements WHERE {} = $1", RECORD_COLUMNS, column);
        let row: Option<EntitlementRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("fetch entitlement"))?;
        row.map(EntitlementRecord::try_from).transpose()
    }
}

pub(super) const RECORD_COLUMNS: &str = "user_id, email, is_premium, subscription_status, \
    expires_at, has_used_trial, trial_start_date, trial_end_date, gateway_customer_id, \
    gateway_subscription_id, cancel_at_period_end, version, created_at, updated_at";

/// Database row representation of an entitlement record.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct EntitlementRow {
    user_id: String,
    email: String,
    is_premium: bool,
    subscription_status: String,
    expires_at: Option<DateTime<Utc>>,
    has_used_trial: bool,
    trial_start_date: Option<DateTime<Utc>>,
    trial_end_date: Option<DateTime<Utc>>,
    gateway_customer_id: Option<String>,
    gateway_subscription_id: Option<String>,
    cancel_at_period_end: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        Ok(EntitlementRecord {
            user_id: UserId::new(row.user_id).map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
            })?,
            email: row.email,
            is_premium: row.is_premium,
            subscription_status: row.subscription_status.parse().map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid status value: {}", e))
            })?,
            expires_at: row.expires_at.map(Timestamp::from_datetime),
            has_used_trial: row.has_used_trial,
            trial_start_date: row.trial_start_date.map(Timestamp::from_datetime),
            trial_end_date: row.trial_end_date.map(Timestamp::from_datetime),
            gateway_customer_id: row.gateway_customer_id,
            gateway_subscription_id: row.gateway_subscription_id,
            cancel_at_period_end: row.cancel_at_period_end,
            version: row.version,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

pub(super) fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", context, e))
}

pub(super) fn datetime(ts: Option<Timestamp>) -> Option<DateTime<Utc>> {
    ts.map(|t| *t.as_datetime())
}

/// Applies a change inside `tx`; the caller commits or rolls back.
pub(super) async fn apply_change(
    tx: &mut Transaction<'_, Postgres>,
    change: &EntitlementChange,
) -> Result<CommitOutcome, DomainError> {
    let record = &change.record;
    let result = sqlx::query(
        r#"
        UPDATE entitlements SET
            email = $3,
            is_premium = $4,
            subscription_status = $5,
            expires_at = $6,
            has_used_trial = $7,
            trial_start_date = $8,
            trial_end_date = $9,
            gateway_customer_id = $10,
            gateway_subscription_id = $11,
            updated_at = $12,
            cancel_at_period_end = $13,
            version = version + 1
        WHERE user_id = $1 AND version = $2
        "#,
    )
    .bind(record.user_id.as_str())
    .bind(record.version)
    .bind(&record.email)
    .bind(record.is_premium)
    .bind(record.subscription_status.as_str())
    .bind(datetime(record.expires_at))
    .bind(record.has_used_trial)
    .bind(datetime(record.trial_start_date))
    .bind(datetime(record.trial_end_date))
    .bind(&record.gateway_customer_id)
    .bind(&record.gateway_subscription_id)
    .bind(*record.updated_at.as_datetime())
    .bind(record.cancel_at_period_end)
    .execute(&mut **tx)
    .await
    .map_err(db_error("update entitlement"))?;

    if result.rows_affected() == 0 {
        let exists: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM entitlements WHERE user_id = $1")
                .bind(record.user_id.as_str())
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_error("check entitlement"))?;
        return match exists {
            Some(_) => Ok(CommitOutcome::VersionConflict),
            None => Err(DomainError::new(
                ErrorCode::EntitlementNotFound,
                format!("No entitlement for user {}", record.user_id),
            )),
        };
    }

    for entry in &change.audit {
        insert_audit(tx, entry).await?;
    }
    if let Some(binding) = &change.device_binding {
        insert_binding(tx, binding).await?;
    }
    if let Some(payment) = &change.payment {
        insert_payment(tx, payment).await?;
    }

    Ok(CommitOutcome::Committed)
}

async fn insert_audit(
    tx: &mut Transaction<'_, Postgres>,
    entry: &AuditEntry,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO entitlement_audit (id, user_id, from_state, to_state, cause, detail, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.user_id.as_str())
    .bind(entry.from_state.as_str())
    .bind(entry.to_state.as_str())
    .bind(entry.cause.code())
    .bind(&entry.detail)
    .bind(*entry.occurred_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(db_error("insert audit entry"))?;
    Ok(())
}

async fn insert_binding(
    tx: &mut Transaction<'_, Postgres>,
    binding: &TrialDeviceBinding,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO trial_device_bindings (device_id, user_id, created_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (device_id, user_id) DO NOTHING
        "#,
    )
    .bind(binding.device_id.as_str())
    .bind(binding.user_id.as_str())
    .bind(*binding.created_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(db_error("insert device binding"))?;
    Ok(())
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &PaymentLogEntry,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO payment_log
            (id, user_id, invoice_id, subscription_id, amount_cents, currency, status, recorded_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.user_id.as_str())
    .bind(&payment.invoice_id)
    .bind(&payment.subscription_id)
    .bind(payment.amount_cents)
    .bind(&payment.currency)
    .bind(payment.status.as_str())
    .bind(*payment.recorded_at.as_datetime())
    .execute(&mut **tx)
    .await
    .map_err(db_error("insert payment log entry"))?;
    Ok(())
}

#[async_trait]
impl EntitlementRepository for PostgresEntitlementRepository {
    async fn insert_if_absent(
        &self,
        record: EntitlementRecord,
    ) -> Result<EntitlementRecord, DomainError> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, email, is_premium, subscription_status,
                has_used_trial, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(record.user_id.as_str())
        .bind(&record.email)
        .bind(record.is_premium)
        .bind(record.subscription_status.as_str())
        .bind(record.has_used_trial)
        .bind(record.version)
        .bind(*record.created_at.as_datetime())
        .bind(*record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_error("insert entitlement"))?;

        self.find_by_user_id(&record.user_id).await?.ok_or_else(|| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Entitlement for {} vanished after insert", record.user_id),
            )
        })
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        self.find_one("user_id", user_id.as_str()).await
    }

    async fn find_by_gateway_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        self.find_one("gateway_subscription_id", subscription_id).await
    }

    async fn find_by_gateway_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        self.find_one("gateway_customer_id", customer_id).await
    }

    async fn commit(&self, change: EntitlementChange) -> Result<CommitOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;
        let outcome = apply_change(&mut tx, &change).await?;
        if outcome == CommitOutcome::Committed {
            tx.commit().await.map_err(db_error("commit entitlement change"))?;
        } else {
            tx.rollback().await.map_err(db_error("roll back entitlement change"))?;
        }
        Ok(outcome)
    }

    async fn record_reminder(
        &self,
        entry: AuditEntry,
        since: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error("begin transaction"))?;

        // Row lock serialises concurrent sweeps for the same user.
        sqlx::query("SELECT 1 FROM entitlements WHERE user_id = $1 FOR UPDATE")
            .bind(entry.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_error("lock entitlement"))?;

        let (already_sent,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM entitlement_audit
                WHERE user_id = $1 AND cause = $2 AND occurred_at >= $3
            )
            "#,
        )
        .bind(entry.user_id.as_str())
        .bind(entry.cause.code())
        .bind(*since.as_datetime())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("check reminder"))?;

        if already_sent {
            tx.rollback().await.map_err(db_error("roll back reminder"))?;
            return Ok(false);
        }

        insert_audit(&mut tx, &entry).await?;
        tx.commit().await.map_err(db_error("commit reminder"))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::{AuditCause, SubscriptionStatus};
    use sqlx::postgres::PgPoolOptions;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .expect("Failed to connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    fn unique_user() -> UserId {
        UserId::new(format!("pg-test-{}", uuid::Uuid::new_v4())).unwrap()
    }

    #[test]
    fn row_with_unknown_status_is_rejected() {
        let now = Utc::now();
        let row = EntitlementRow {
            user_id: "u1".to_string(),
            email: "a@example.com".to_string(),
            is_premium: false,
            subscription_status: "bogus".to_string(),
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
        };
        let err = EntitlementRecord::try_from(row).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn commit_is_conditional_on_version() {
        let repo = PostgresEntitlementRepository::new(test_pool().await);
        let user = unique_user();
        let now = Timestamp::now();
        let record = repo
            .insert_if_absent(EntitlementRecord::new(user.clone(), "pg@example.com", now))
            .await
            .unwrap();

        let mut first = record.clone();
        let transition_end = first.start_trial(14, now).unwrap();
        let audit = AuditEntry::new(
            user.clone(),
            SubscriptionStatus::None,
            SubscriptionStatus::Trialing,
            AuditCause::Started,
            now,
        );
        assert_eq!(
            repo.commit(EntitlementChange::new(first).with_audit(audit)).await.unwrap(),
            CommitOutcome::Committed
        );

        let mut stale = record;
        stale.mark_canceled(now);
        assert_eq!(
            repo.commit(EntitlementChange::new(stale)).await.unwrap(),
            CommitOutcome::VersionConflict
        );

        let stored = repo.find_by_user_id(&user).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.trial_end_date.map(|t| t.as_unix_secs()), Some(transition_end.as_unix_secs()));
    }

    #[tokio::test]
    #[ignore = "requires DATABASE_URL"]
    async fn reminder_is_recorded_once() {
        let repo = PostgresEntitlementRepository::new(test_pool().await);
        let user = unique_user();
        let now = Timestamp::now();
        repo.insert_if_absent(EntitlementRecord::new(user.clone(), "pg@example.com", now))
            .await
            .unwrap();

        let entry = || {
            AuditEntry::new(
                user.clone(),
                SubscriptionStatus::Trialing,
                SubscriptionStatus::Trialing,
                AuditCause::ReminderSent(1),
                now,
            )
        };
        assert!(repo.record_reminder(entry(), now.minus_hours(24)).await.unwrap());
        assert!(!repo.record_reminder(entry(), now.minus_hours(24)).await.unwrap());
    }
}
