//! ReminderSweepHandler - Warns users whose trial is about to end.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementError, Notification, SubscriptionStatus,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementReader, EntitlementRepository, Notifier};

/// A reminder is skipped if the same one was recorded within this window.
const REMINDER_DEDUP_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReminderReport {
    pub sent: u32,
    /// Already reminded within the window.
    pub skipped: u32,
    pub errors: u32,
}

/// Handler for the trial reminder sweep.
///
/// For every configured lead time `d`, trials ending during the calendar day
/// `today + d` get one reminder. The reminder is recorded before it is sent,
/// so overlapping runs never notify twice.
pub struct ReminderSweepHandler {
    repository: Arc<dyn EntitlementRepository>,
    reader: Arc<dyn EntitlementReader>,
    notifier: Arc<dyn Notifier>,
    reminder_days: Vec<u32>,
}

impl ReminderSweepHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        reader: Arc<dyn EntitlementReader>,
        notifier: Arc<dyn Notifier>,
        reminder_days: Vec<u32>,
    ) -> Self {
        Self {
            repository,
            reader,
            notifier,
            reminder_days,
        }
    }

    pub async fn handle(&self) -> Result<ReminderReport, EntitlementError> {
        let now = Timestamp::now();
        let mut report = ReminderReport::default();

        for &days in &self.reminder_days {
            let start = now.add_days(i64::from(days)).start_of_day();
            let end = start.add_days(1);
            let trials = match self.reader.find_trials_ending_between(start, end).await {
                Ok(trials) => trials,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(days, error = %e, "Trial reminder selection failed");
                    continue;
                }
            };

            for record in trials {
                match self.remind(&record.user_id, days, now).await {
                    Ok(true) => report.sent += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        report.errors += 1;
                        tracing::warn!(user_id = %record.user_id, days, error = %e, "Trial reminder failed");
                    }
                }
            }
        }

        tracing::info!(
            sent = report.sent,
            skipped = report.skipped,
            errors = report.errors,
            "Reminder sweep finished"
        );
        Ok(report)
    }

    async fn remind(&self, user_id: &UserId, days: u32, now: Timestamp) -> Result<bool, EntitlementError> {
        let entry = AuditEntry::new(
            user_id.clone(),
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Trialing,
            AuditCause::ReminderSent(days),
            now,
        );
        let recorded = self
            .repository
            .record_reminder(entry, now.minus_hours(REMINDER_DEDUP_HOURS))
            .await?;
        if !recorded {
            return Ok(false);
        }

        if let Err(e) = self
            .notifier
            .notify(Notification::trial_reminder(user_id.clone(), days, now))
            .await
        {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to queue trial reminder");
        }
        Ok(true)
    }
}
