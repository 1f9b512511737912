//! EntitlementService - one entry point over every handler.
//!
//! Callers (an HTTP layer, a CLI, the scheduler) hold an
//! `Arc<EntitlementService>` instead of wiring handlers themselves.

use std::sync::Arc;
use std::time::Duration;

use crate::config::TrialConfig;
use crate::domain::billing::{PaymentLogEntry, WebhookError};
use crate::domain::entitlement::{
    AuditEntry, Eligibility, EntitlementError, EntitlementRecord, TrialStatusView,
};
use crate::domain::foundation::{DeviceId, UserId};
use crate::ports::{
    CancellationMode, EntitlementReader, EntitlementRepository, Notifier, PaymentGateway,
    SubscriptionInfo, WebhookEventRepository,
};

use super::handlers::{
    AuditReport, CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionOutcome,
    CheckEligibilityHandler, CheckEligibilityQuery, ConvertTrialCommand, ConvertTrialHandler,
    ConvertTrialOutcome, DowngradeSweepHandler, EnsureEntitlementCommand, EnsureEntitlementHandler,
    EntitlementStatsView, ExtendTrialCommand, ExtendTrialHandler, ExtendTrialOutcome,
    FullAuditHandler, GetAuditTrailHandler, GetEntitlementStatsHandler, GetHistoryQuery,
    GetPaymentHistoryHandler, GetSubscriptionInfoHandler, GetSubscriptionInfoQuery,
    GetTrialStatusHandler, GetTrialStatusQuery, IngestWebhookCommand, IngestWebhookHandler,
    IngestWebhookResult, PruneWebhookLogCommand, PruneWebhookLogHandler,
    ReactivateSubscriptionCommand, ReactivateSubscriptionHandler, ReactivateSubscriptionOutcome,
    ReminderReport, ReminderSweepHandler, StartTrialCommand, StartTrialHandler, StartTrialOutcome,
    SweepReport,
};

/// Ports the service is built from.
#[derive(Clone)]
pub struct ServiceDependencies {
    pub repository: Arc<dyn EntitlementRepository>,
    pub reader: Arc<dyn EntitlementReader>,
    pub webhook_events: Arc<dyn WebhookEventRepository>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
}

pub struct EntitlementService {
    ensure: EnsureEntitlementHandler,
    eligibility: CheckEligibilityHandler,
    start: StartTrialHandler,
    status: GetTrialStatusHandler,
    convert: ConvertTrialHandler,
    extend: ExtendTrialHandler,
    cancel: CancelSubscriptionHandler,
    reactivate: ReactivateSubscriptionHandler,
    subscription_info: GetSubscriptionInfoHandler,
    ingest: IngestWebhookHandler,
    prune: PruneWebhookLogHandler,
    downgrade: DowngradeSweepHandler,
    reminders: ReminderSweepHandler,
    audit: FullAuditHandler,
    stats: GetEntitlementStatsHandler,
    audit_trail: GetAuditTrailHandler,
    payments: GetPaymentHistoryHandler,
}

impl EntitlementService {
    pub fn new(deps: ServiceDependencies, trial: &TrialConfig, gateway_timeout: Duration) -> Self {
        let policy = trial.eligibility_policy();
        Self {
            ensure: EnsureEntitlementHandler::new(deps.repository.clone()),
            eligibility: CheckEligibilityHandler::new(
                deps.repository.clone(),
                deps.reader.clone(),
                policy,
            ),
            start: StartTrialHandler::new(
                deps.repository.clone(),
                deps.reader.clone(),
                policy,
                trial.duration_days,
            ),
            status: GetTrialStatusHandler::new(deps.repository.clone()),
            convert: ConvertTrialHandler::new(
                deps.repository.clone(),
                deps.gateway.clone(),
                gateway_timeout,
            ),
            cancel: CancelSubscriptionHandler::new(
                deps.repository.clone(),
                deps.gateway.clone(),
                gateway_timeout,
            ),
            reactivate: ReactivateSubscriptionHandler::new(
                deps.repository.clone(),
                deps.gateway.clone(),
                gateway_timeout,
            ),
            subscription_info: GetSubscriptionInfoHandler::new(
                deps.repository.clone(),
                deps.gateway.clone(),
                gateway_timeout,
            ),
            extend: ExtendTrialHandler::new(
                deps.repository.clone(),
                trial.enable_extensions,
                trial.max_extension_days,
            ),
            ingest: IngestWebhookHandler::new(
                deps.repository.clone(),
                deps.webhook_events.clone(),
                deps.gateway.clone(),
                deps.notifier.clone(),
            ),
            prune: PruneWebhookLogHandler::new(deps.webhook_events.clone()),
            downgrade: DowngradeSweepHandler::new(
                deps.repository.clone(),
                deps.reader.clone(),
                deps.notifier.clone(),
            ),
            reminders: ReminderSweepHandler::new(
                deps.repository.clone(),
                deps.reader.clone(),
                deps.notifier.clone(),
                trial.reminder_days.clone(),
            ),
            audit: FullAuditHandler::new(deps.repository.clone(), deps.reader.clone()),
            stats: GetEntitlementStatsHandler::new(deps.reader.clone()),
            audit_trail: GetAuditTrailHandler::new(deps.reader.clone()),
            payments: GetPaymentHistoryHandler::new(deps.reader),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Trials
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn ensure_entitlement(
        &self,
        user_id: UserId,
        email: &str,
    ) -> Result<EntitlementRecord, EntitlementError> {
        self.ensure
            .handle(EnsureEntitlementCommand {
                user_id,
                email: email.to_string(),
            })
            .await
    }

    pub async fn check_trial_eligibility(
        &self,
        user_id: UserId,
        device_id: Option<DeviceId>,
    ) -> Result<Eligibility, EntitlementError> {
        self.eligibility
            .handle(CheckEligibilityQuery { user_id, device_id })
            .await
    }

    pub async fn start_trial(
        &self,
        user_id: UserId,
        device_id: Option<DeviceId>,
    ) -> Result<StartTrialOutcome, EntitlementError> {
        self.start.handle(StartTrialCommand { user_id, device_id }).await
    }

    pub async fn get_trial_status(
        &self,
        user_id: UserId,
    ) -> Result<Option<TrialStatusView>, EntitlementError> {
        self.status.handle(GetTrialStatusQuery { user_id }).await
    }

    pub async fn convert_trial(
        &self,
        user_id: UserId,
        price_id: &str,
        payment_method_id: Option<String>,
    ) -> Result<ConvertTrialOutcome, EntitlementError> {
        self.convert
            .handle(ConvertTrialCommand {
                user_id,
                price_id: price_id.to_string(),
                payment_method_id,
            })
            .await
    }

    pub async fn extend_trial(
        &self,
        user_id: UserId,
        additional_days: u32,
    ) -> Result<ExtendTrialOutcome, EntitlementError> {
        self.extend
            .handle(ExtendTrialCommand {
                user_id,
                additional_days,
            })
            .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Subscriptions
    // ════════════════════════════════════════════════════════════════════════════

    /// Cancels now, or at the end of the paid period when `immediately` is false.
    pub async fn cancel_subscription(
        &self,
        user_id: UserId,
        immediately: bool,
    ) -> Result<CancelSubscriptionOutcome, EntitlementError> {
        let mode = if immediately {
            CancellationMode::Immediately
        } else {
            CancellationMode::AtPeriodEnd
        };
        self.cancel
            .handle(CancelSubscriptionCommand { user_id, mode })
            .await
    }

    pub async fn reactivate_subscription(
        &self,
        user_id: UserId,
    ) -> Result<ReactivateSubscriptionOutcome, EntitlementError> {
        self.reactivate
            .handle(ReactivateSubscriptionCommand { user_id })
            .await
    }

    pub async fn subscription_info(
        &self,
        user_id: UserId,
    ) -> Result<Option<SubscriptionInfo>, EntitlementError> {
        self.subscription_info
            .handle(GetSubscriptionInfoQuery { user_id })
            .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Webhooks
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn ingest_webhook_event(
        &self,
        payload: Vec<u8>,
        signature: String,
    ) -> Result<IngestWebhookResult, WebhookError> {
        self.ingest
            .handle(IngestWebhookCommand { payload, signature })
            .await
    }

    pub async fn prune_webhook_log(&self, older_than_days: u32) -> Result<u64, EntitlementError> {
        self.prune
            .handle(PruneWebhookLogCommand { older_than_days })
            .await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Reconciliation
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn run_downgrade_sweep(&self) -> Result<SweepReport, EntitlementError> {
        self.downgrade.handle().await
    }

    pub async fn run_reminder_sweep(&self) -> Result<ReminderReport, EntitlementError> {
        self.reminders.handle().await
    }

    pub async fn run_full_audit(&self) -> Result<AuditReport, EntitlementError> {
        self.audit.handle().await
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Reporting
    // ════════════════════════════════════════════════════════════════════════════

    pub async fn get_entitlement_stats(&self) -> Result<EntitlementStatsView, EntitlementError> {
        self.stats.handle().await
    }

    pub async fn audit_trail(&self, user_id: UserId) -> Result<Vec<AuditEntry>, EntitlementError> {
        self.audit_trail.handle(GetHistoryQuery { user_id }).await
    }

    pub async fn payment_history(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PaymentLogEntry>, EntitlementError> {
        self.payments.handle(GetHistoryQuery { user_id }).await
    }
}
