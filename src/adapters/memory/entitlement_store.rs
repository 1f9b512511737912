//! In-memory entitlement store.
//!
//! Implements every storage port behind one mutex, so a unit of work is
//! applied atomically exactly as the Postgres adapter does with a
//! transaction. Used by tests and for running the service without a
//! database.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::domain::billing::PaymentLogEntry;
use crate::domain::entitlement::{
    normalize_email, AuditEntry, EntitlementRecord, SubscriptionStatus, TrialDeviceBinding,
};
use crate::domain::foundation::{DeviceId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{
    CommitOutcome, EntitlementChange, EntitlementReader, EntitlementRepository,
    EntitlementStatistics, WebhookEventRecord, WebhookEventRepository,
};

#[derive(Default)]
struct StoreState {
    records: HashMap<UserId, EntitlementRecord>,
    audit: Vec<AuditEntry>,
    device_bindings: HashMap<(DeviceId, UserId), TrialDeviceBinding>,
    payments: Vec<PaymentLogEntry>,
    webhook_events: HashMap<String, WebhookEventRecord>,
    failing_users: HashSet<UserId>,
    failing_trial_windows: Vec<Timestamp>,
}

impl StoreState {
    fn check_writable(&self, change: &EntitlementChange) -> Result<CommitOutcome, DomainError> {
        let user_id = &change.record.user_id;
        if self.failing_users.contains(user_id) {
            return Err(DomainError::database(format!(
                "write failure injected for user {}",
                user_id
            )));
        }
        let stored = self.records.get(user_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::EntitlementNotFound,
                format!("No entitlement for user {}", user_id),
            )
        })?;
        if stored.version != change.record.version {
            return Ok(CommitOutcome::VersionConflict);
        }
        Ok(CommitOutcome::Committed)
    }

    fn apply(&mut self, change: EntitlementChange) {
        let mut record = change.record;
        record.version += 1;
        if let Some(binding) = change.device_binding {
            self.device_bindings
                .entry((binding.device_id.clone(), binding.user_id.clone()))
                .or_insert(binding);
        }
        self.audit.extend(change.audit);
        if let Some(payment) = change.payment {
            self.payments.push(payment);
        }
        self.records.insert(record.user_id.clone(), record);
    }
}

#[derive(Default)]
pub struct InMemoryEntitlementStore {
    state: Mutex<StoreState>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "entitlement store lock poisoned"))
    }

    // === Test Helpers ===

    /// Stores `record` as-is, bypassing version checks.
    ///
    /// Lets tests set up drifted states that no operation would produce.
    pub fn seed(&self, record: EntitlementRecord) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        state.records.insert(record.user_id.clone(), record);
        Ok(())
    }

    /// Adds a device binding directly.
    pub fn seed_device_binding(&self, binding: TrialDeviceBinding) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        state
            .device_bindings
            .insert((binding.device_id.clone(), binding.user_id.clone()), binding);
        Ok(())
    }

    /// Makes every commit touching `user_id` fail until cleared.
    pub fn fail_commits_for(&self, user_id: UserId) -> Result<(), DomainError> {
        self.lock()?.failing_users.insert(user_id);
        Ok(())
    }

    /// Makes trial-window queries starting at `start` fail until cleared.
    pub fn fail_trial_window_starting(&self, start: Timestamp) -> Result<(), DomainError> {
        self.lock()?.failing_trial_windows.push(start);
        Ok(())
    }

    pub fn clear_failures(&self) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        state.failing_users.clear();
        state.failing_trial_windows.clear();
        Ok(())
    }

    /// Number of webhook events logged.
    pub fn webhook_event_count(&self) -> Result<usize, DomainError> {
        Ok(self.lock()?.webhook_events.len())
    }
}

#[async_trait]
impl EntitlementRepository for InMemoryEntitlementStore {
    async fn insert_if_absent(
        &self,
        record: EntitlementRecord,
    ) -> Result<EntitlementRecord, DomainError> {
        let mut state = self.lock()?;
        let stored = state
            .records
            .entry(record.user_id.clone())
            .or_insert(record);
        Ok(stored.clone())
    }

    async fn find_by_user_id(
        &self,
        user_id: &UserId,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        Ok(self.lock()?.records.get(user_id).cloned())
    }

    async fn find_by_gateway_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        Ok(self
            .lock()?
            .records
            .values()
            .find(|r| r.gateway_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn find_by_gateway_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        Ok(self
            .lock()?
            .records
            .values()
            .find(|r| r.gateway_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn commit(&self, change: EntitlementChange) -> Result<CommitOutcome, DomainError> {
        let mut state = self.lock()?;
        let outcome = state.check_writable(&change)?;
        if outcome == CommitOutcome::Committed {
            state.apply(change);
        }
        Ok(outcome)
    }

    async fn record_reminder(
        &self,
        entry: AuditEntry,
        since: Timestamp,
    ) -> Result<bool, DomainError> {
        let mut state = self.lock()?;
        let already_sent = state.audit.iter().any(|existing| {
            existing.user_id == entry.user_id
                && existing.cause == entry.cause
                && !existing.occurred_at.is_before(&since)
        });
        if already_sent {
            return Ok(false);
        }
        state.audit.push(entry);
        Ok(true)
    }
}

#[async_trait]
impl EntitlementReader for InMemoryEntitlementStore {
    async fn count_used_trials_by_email(&self, email: &str) -> Result<u32, DomainError> {
        let email = normalize_email(email);
        let count = self
            .lock()?
            .records
            .values()
            .filter(|r| r.has_used_trial && r.email == email)
            .count();
        Ok(count as u32)
    }

    async fn count_device_bindings(&self, device_id: &DeviceId) -> Result<u32, DomainError> {
        let count = self
            .lock()?
            .device_bindings
            .keys()
            .filter(|(device, _)| device == device_id)
            .count();
        Ok(count as u32)
    }

    async fn find_downgrade_candidates(&self, now: Timestamp) -> Result<Vec<UserId>, DomainError> {
        let mut ids: Vec<UserId> = self
            .lock()?
            .records
            .values()
            .filter(|r| {
                r.is_premium
                    && (r.expires_at.map_or(false, |e| e.is_before(&now))
                        || r.subscription_status.is_lapsed())
            })
            .map(|r| r.user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn find_trials_ending_between(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<EntitlementRecord>, DomainError> {
        let state = self.lock()?;
        if state.failing_trial_windows.contains(&start) {
            return Err(DomainError::database(format!(
                "read failure injected for trial window starting {}",
                start
            )));
        }
        let mut records: Vec<EntitlementRecord> = state
            .records
            .values()
            .filter(|r| r.subscription_status == SubscriptionStatus::Trialing)
            .filter(|r| {
                r.trial_end_date
                    .map_or(false, |d| !d.is_before(&start) && d.is_before(&end))
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }

    async fn find_audit_candidates(&self) -> Result<Vec<UserId>, DomainError> {
        let mut ids: Vec<UserId> = self
            .lock()?
            .records
            .values()
            .filter(|r| r.is_premium || r.gateway_subscription_id.is_some())
            .map(|r| r.user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn audit_trail(&self, user_id: &UserId) -> Result<Vec<AuditEntry>, DomainError> {
        let mut entries: Vec<AuditEntry> = self
            .lock()?
            .audit
            .iter()
            .filter(|e| &e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.occurred_at);
        Ok(entries)
    }

    async fn payment_history(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PaymentLogEntry>, DomainError> {
        let mut entries: Vec<PaymentLogEntry> = self
            .lock()?
            .payments
            .iter()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|p| p.recorded_at);
        Ok(entries)
    }

    async fn statistics(&self) -> Result<EntitlementStatistics, DomainError> {
        let state = self.lock()?;
        let now = Timestamp::now();
        let mut stats = EntitlementStatistics::default();
        let mut trial_days: Vec<i64> = Vec::new();
        for record in state.records.values() {
            stats.total_records += 1;
            if record.is_premium {
                stats.premium += 1;
            }
            match record.subscription_status {
                SubscriptionStatus::Trialing => stats.trialing += 1,
                SubscriptionStatus::Active => stats.active += 1,
                SubscriptionStatus::Canceled => stats.canceled += 1,
                SubscriptionStatus::Expired | SubscriptionStatus::TrialExpired => {
                    stats.expired += 1
                }
                _ => {}
            }
            if record.has_used_trial {
                stats.trials_started += 1;
                if record.subscription_status == SubscriptionStatus::Active {
                    stats.converted_trials += 1;
                }
                if let Some(start) = record.trial_start_date {
                    let until = record.expires_at.unwrap_or(now);
                    trial_days.push(until.duration_since(&start).num_days());
                }
            }
        }
        if !trial_days.is_empty() {
            stats.average_trial_duration_days =
                trial_days.iter().sum::<i64>() as f64 / trial_days.len() as f64;
        }
        Ok(stats)
    }
}

#[async_trait]
impl WebhookEventRepository for InMemoryEntitlementStore {
    async fn find_by_event_id(
        &self,
        event_id: &str,
    ) -> Result<Option<WebhookEventRecord>, DomainError> {
        Ok(self.lock()?.webhook_events.get(event_id).cloned())
    }

    async fn commit_event(
        &self,
        event: WebhookEventRecord,
        change: Option<EntitlementChange>,
    ) -> Result<CommitOutcome, DomainError> {
        let mut state = self.lock()?;
        if state.webhook_events.contains_key(&event.event_id) {
            return Ok(CommitOutcome::DuplicateEvent);
        }
        if let Some(change) = change {
            let outcome = state.check_writable(&change)?;
            if outcome != CommitOutcome::Committed {
                return Ok(outcome);
            }
            state.apply(change);
        }
        state.webhook_events.insert(event.event_id.clone(), event);
        Ok(CommitOutcome::Committed)
    }

    async fn delete_before(&self, cutoff: Timestamp) -> Result<u64, DomainError> {
        let mut state = self.lock()?;
        let before = state.webhook_events.len();
        state
            .webhook_events
            .retain(|_, event| !event.received_at.is_before(&cutoff));
        Ok((before - state.webhook_events.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::AuditCause;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    async fn store_with(id: &str, email: &str) -> (InMemoryEntitlementStore, EntitlementRecord) {
        let store = InMemoryEntitlementStore::new();
        let record = store
            .insert_if_absent(EntitlementRecord::new(user(id), email, Timestamp::now()))
            .await
            .unwrap();
        (store, record)
    }

    // ════════════════════════════════════════════════════════════════════════
    // Conditional commits
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn insert_if_absent_keeps_existing_record() {
        let (store, original) = store_with("u1", "a@example.com").await;
        let again = store
            .insert_if_absent(EntitlementRecord::new(user("u1"), "other@example.com", Timestamp::now()))
            .await
            .unwrap();
        assert_eq!(again.email, original.email);
    }

    #[tokio::test]
    async fn commit_bumps_version() {
        let (store, mut record) = store_with("u1", "a@example.com").await;
        record.start_trial(14, Timestamp::now()).unwrap();

        let outcome = store.commit(EntitlementChange::new(record)).await.unwrap();

        assert_eq!(outcome, CommitOutcome::Committed);
        let stored = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.has_used_trial);
    }

    #[tokio::test]
    async fn stale_commit_is_rejected_without_side_rows() {
        let (store, record) = store_with("u1", "a@example.com").await;
        let now = Timestamp::now();

        let mut first = record.clone();
        first.start_trial(14, now).unwrap();
        store.commit(EntitlementChange::new(first)).await.unwrap();

        let mut second = record;
        second.mark_canceled(now);
        let audit = AuditEntry::new(
            user("u1"),
            SubscriptionStatus::None,
            SubscriptionStatus::Canceled,
            AuditCause::Canceled,
            now,
        );
        let outcome = store
            .commit(EntitlementChange::new(second).with_audit(audit))
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::VersionConflict);
        assert!(store.audit_trail(&user("u1")).await.unwrap().is_empty());
        let stored = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(stored.subscription_status, SubscriptionStatus::Trialing);
    }

    #[tokio::test]
    async fn commit_for_unknown_user_fails() {
        let store = InMemoryEntitlementStore::new();
        let record = EntitlementRecord::new(user("ghost"), "g@example.com", Timestamp::now());
        let err = store.commit(EntitlementChange::new(record)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::EntitlementNotFound);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_database_error() {
        let (store, record) = store_with("u1", "a@example.com").await;
        store.fail_commits_for(user("u1")).unwrap();
        let err = store.commit(EntitlementChange::new(record)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Webhook log
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn duplicate_event_writes_nothing() {
        let (store, record) = store_with("u1", "a@example.com").await;
        let now = Timestamp::now();
        let event = WebhookEventRecord::applied("evt_1", "customer.subscription.updated", now);

        let first = store
            .commit_event(event.clone(), Some(EntitlementChange::new(record.clone())))
            .await
            .unwrap();
        let second = store
            .commit_event(event, Some(EntitlementChange::new(record)))
            .await
            .unwrap();

        assert_eq!(first, CommitOutcome::Committed);
        assert_eq!(second, CommitOutcome::DuplicateEvent);
        let stored = store.find_by_user_id(&user("u1")).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn conflicting_event_change_leaves_log_untouched() {
        let (store, mut record) = store_with("u1", "a@example.com").await;
        record.version = 7;
        let event = WebhookEventRecord::applied("evt_1", "customer.subscription.updated", Timestamp::now());

        let outcome = store
            .commit_event(event, Some(EntitlementChange::new(record)))
            .await
            .unwrap();

        assert_eq!(outcome, CommitOutcome::VersionConflict);
        assert!(store.find_by_event_id("evt_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_before_prunes_old_events() {
        let store = InMemoryEntitlementStore::new();
        let now = Timestamp::now();
        store
            .commit_event(WebhookEventRecord::applied("old", "t", now.minus_days(100)), None)
            .await
            .unwrap();
        store
            .commit_event(WebhookEventRecord::applied("new", "t", now), None)
            .await
            .unwrap();

        let deleted = store.delete_before(now.minus_days(90)).await.unwrap();

        assert_eq!(deleted, 1);
        assert_eq!(store.webhook_event_count().unwrap(), 1);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Reader queries
    // ════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn email_count_is_case_insensitive_and_only_counts_used_trials() {
        let store = InMemoryEntitlementStore::new();
        let now = Timestamp::now();
        let mut used = EntitlementRecord::new(user("u1"), "Shared@Example.com", now);
        used.has_used_trial = true;
        store.seed(used).unwrap();
        store
            .seed(EntitlementRecord::new(user("u2"), "shared@example.com", now))
            .unwrap();

        assert_eq!(
            store.count_used_trials_by_email("SHARED@example.com").await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn device_bindings_are_unique_per_user() {
        let store = InMemoryEntitlementStore::new();
        let now = Timestamp::now();
        let device = DeviceId::new("d1").unwrap();
        for id in ["u1", "u1", "u2"] {
            store
                .seed_device_binding(TrialDeviceBinding::new(device.clone(), user(id), now))
                .unwrap();
        }
        assert_eq!(store.count_device_bindings(&device).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn downgrade_candidates_match_selection_rule() {
        let store = InMemoryEntitlementStore::new();
        let now = Timestamp::now();
        let base = |id: &str| EntitlementRecord::new(user(id), "x@example.com", now);

        store
            .seed(EntitlementRecord {
                is_premium: true,
                subscription_status: SubscriptionStatus::Trialing,
                expires_at: Some(now.minus_hours(1)),
                ..base("lapsed")
            })
            .unwrap();
        store
            .seed(EntitlementRecord {
                is_premium: true,
                subscription_status: SubscriptionStatus::Unpaid,
                expires_at: Some(now.add_days(5)),
                ..base("unpaid")
            })
            .unwrap();
        store
            .seed(EntitlementRecord {
                is_premium: true,
                subscription_status: SubscriptionStatus::Active,
                expires_at: Some(now.add_days(5)),
                ..base("healthy")
            })
            .unwrap();

        let ids = store.find_downgrade_candidates(now).await.unwrap();
        assert_eq!(ids, vec![user("lapsed"), user("unpaid")]);
    }

    #[tokio::test]
    async fn record_reminder_is_once_per_window() {
        let (store, _) = store_with("u1", "a@example.com").await;
        let now = Timestamp::now();
        let entry = || {
            AuditEntry::new(
                user("u1"),
                SubscriptionStatus::Trialing,
                SubscriptionStatus::Trialing,
                AuditCause::ReminderSent(3),
                now,
            )
        };

        assert!(store.record_reminder(entry(), now.minus_hours(24)).await.unwrap());
        assert!(!store.record_reminder(entry(), now.minus_hours(24)).await.unwrap());
    }

    #[tokio::test]
    async fn statistics_count_conversions() {
        let store = InMemoryEntitlementStore::new();
        let now = Timestamp::now();
        let base = |id: &str| EntitlementRecord::new(user(id), "x@example.com", now);
        store
            .seed(EntitlementRecord {
                has_used_trial: true,
                subscription_status: SubscriptionStatus::Active,
                is_premium: true,
                gateway_subscription_id: Some("sub_1".to_string()),
                ..base("converted")
            })
            .unwrap();
        store
            .seed(EntitlementRecord {
                has_used_trial: true,
                subscription_status: SubscriptionStatus::TrialExpired,
                ..base("lapsed")
            })
            .unwrap();

        let stats = store.statistics().await.unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.trials_started, 2);
        assert_eq!(stats.converted_trials, 1);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.conversion_rate(), 50.0);
    }
}
