//! IngestWebhookHandler - Command handler for payment gateway webhooks.
//!
//! Each event is applied at most once. The idempotency row and the
//! entitlement change are committed in one unit, so a crash between them
//! cannot leave an event half-applied, and a replay is a no-op.

use std::sync::Arc;

use crate::application::handlers::retry::MAX_COMMIT_ATTEMPTS;
use crate::domain::billing::{
    GatewayEvent, GatewayEventKind, InvoiceSummary, PaymentLogEntry, PaymentStatus,
    SubscriptionSnapshot, WebhookError,
};
use crate::domain::entitlement::{
    AuditCause, AuditEntry, EntitlementRecord, Notification, Transition,
};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use crate::ports::{
    CommitOutcome, EntitlementChange, EntitlementRepository, Notifier, PaymentGateway,
    WebhookEventRecord, WebhookEventRepository,
};

/// Command to ingest a webhook delivery.
#[derive(Debug, Clone)]
pub struct IngestWebhookCommand {
    /// Raw request body, exactly as received.
    pub payload: Vec<u8>,
    /// Signature header value.
    pub signature: String,
}

/// Result of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestWebhookResult {
    /// The event changed (or was recorded against) a user's entitlement.
    Applied { event_id: String, user_id: UserId },
    /// The event was processed before; nothing happened.
    Duplicate { event_id: String },
    /// The event was logged but needs no action.
    Ignored { event_id: String, reason: String },
}

/// What one attempt intends to commit.
struct Plan {
    log: WebhookEventRecord,
    change: Option<EntitlementChange>,
    notification: Option<Notification>,
    user_id: Option<UserId>,
}

impl Plan {
    fn ignored(event: &GatewayEvent, reason: &str, now: Timestamp) -> Self {
        Self {
            log: WebhookEventRecord::ignored(&event.id, &event.event_type, reason, now),
            change: None,
            notification: None,
            user_id: None,
        }
    }

    fn applied(event: &GatewayEvent, change: EntitlementChange, now: Timestamp) -> Self {
        Self {
            log: WebhookEventRecord::applied(&event.id, &event.event_type, now),
            user_id: Some(change.record.user_id.clone()),
            change: Some(change),
            notification: None,
        }
    }
}

/// Handler for payment gateway webhooks.
pub struct IngestWebhookHandler {
    repository: Arc<dyn EntitlementRepository>,
    webhook_events: Arc<dyn WebhookEventRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
}

impl IngestWebhookHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        webhook_events: Arc<dyn WebhookEventRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repository,
            webhook_events,
            gateway,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: IngestWebhookCommand,
    ) -> Result<IngestWebhookResult, WebhookError> {
        // 1. Verify signature and decode
        let event = self
            .gateway
            .verify_webhook(&cmd.payload, &cmd.signature)
            .map_err(|e| {
                if e.is_integrity_violation() {
                    tracing::warn!(error = %e, "Rejected webhook delivery");
                } else {
                    tracing::info!(error = %e, "Undecodable webhook delivery");
                }
                e
            })?;

        // 2. Cheap replay check; the commit re-checks atomically
        if self
            .webhook_events
            .find_by_event_id(&event.id)
            .await
            .map_err(storage)?
            .is_some()
        {
            tracing::debug!(event_id = %event.id, "Duplicate webhook event");
            return Ok(IngestWebhookResult::Duplicate { event_id: event.id });
        }

        // 3. Checkout only carries references; fetch the subscription once
        let checkout_snapshot = self.checkout_snapshot(&event).await?;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let now = Timestamp::now();
            let plan = self.plan(&event, checkout_snapshot.as_ref(), now).await?;

            match self
                .webhook_events
                .commit_event(plan.log.clone(), plan.change)
                .await
                .map_err(storage)?
            {
                CommitOutcome::Committed => {
                    return Ok(self.finish(&event, plan.log, plan.user_id, plan.notification).await);
                }
                CommitOutcome::DuplicateEvent => {
                    tracing::debug!(event_id = %event.id, "Webhook event committed concurrently");
                    return Ok(IngestWebhookResult::Duplicate { event_id: event.id });
                }
                CommitOutcome::VersionConflict => {
                    tracing::debug!(event_id = %event.id, attempt, "Webhook commit conflicted, retrying");
                }
            }
        }

        tracing::warn!(event_id = %event.id, "Webhook gave up after repeated conflicts");
        Err(WebhookError::Conflict(event.id))
    }

    async fn finish(
        &self,
        event: &GatewayEvent,
        log: WebhookEventRecord,
        user_id: Option<UserId>,
        notification: Option<Notification>,
    ) -> IngestWebhookResult {
        if let Some(notification) = notification {
            if let Err(e) = self.notifier.notify(notification).await {
                tracing::warn!(event_id = %event.id, error = %e, "Failed to queue notification");
            }
        }

        match user_id {
            Some(user_id) => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    user_id = %user_id,
                    "Webhook applied"
                );
                IngestWebhookResult::Applied {
                    event_id: event.id.clone(),
                    user_id,
                }
            }
            None => {
                let reason = log.note.unwrap_or_default();
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    %reason,
                    "Webhook ignored"
                );
                IngestWebhookResult::Ignored {
                    event_id: event.id.clone(),
                    reason,
                }
            }
        }
    }

    async fn checkout_snapshot(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<SubscriptionSnapshot>, WebhookError> {
        let GatewayEventKind::CheckoutCompleted(checkout) = &event.kind else {
            return Ok(None);
        };
        if !checkout.is_subscription() {
            return Ok(None);
        }
        if checkout.user_id.is_none() {
            return Err(WebhookError::MissingMetadata("user_id"));
        }
        let subscription_id = checkout
            .subscription_id
            .as_deref()
            .ok_or(WebhookError::MissingMetadata("subscription"))?;

        self.gateway
            .get_subscription(subscription_id)
            .await
            .map_err(|e| WebhookError::Gateway(e.to_string()))?
            .ok_or_else(|| {
                WebhookError::Gateway(format!("subscription {} not found", subscription_id))
            })
            .map(Some)
    }

    async fn plan(
        &self,
        event: &GatewayEvent,
        checkout_snapshot: Option<&SubscriptionSnapshot>,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        match &event.kind {
            GatewayEventKind::SubscriptionChanged(snapshot) => {
                let record = self.resolve(event, Some(&snapshot.id), &snapshot.customer_id).await?;
                Ok(self.sync_plan(event, record, snapshot, now))
            }
            GatewayEventKind::CheckoutCompleted(_) => match checkout_snapshot {
                Some(snapshot) => {
                    let record =
                        self.resolve(event, Some(&snapshot.id), &snapshot.customer_id).await?;
                    Ok(self.sync_plan(event, record, snapshot, now))
                }
                None => Ok(Plan::ignored(event, "checkout is not a subscription", now)),
            },
            GatewayEventKind::SubscriptionDeleted(snapshot) => {
                let mut record =
                    self.resolve(event, Some(&snapshot.id), &snapshot.customer_id).await?;
                let transition = record.mark_canceled(now);
                let change = with_transition_audit(
                    EntitlementChange::new(record),
                    &transition,
                    AuditCause::Canceled,
                    event,
                    now,
                );
                Ok(Plan::applied(event, change, now))
            }
            GatewayEventKind::InvoicePaid(invoice) => {
                self.invoice_plan(event, invoice, PaymentStatus::Succeeded, now).await
            }
            GatewayEventKind::InvoicePaymentFailed(invoice) => {
                self.invoice_plan(event, invoice, PaymentStatus::Failed, now).await
            }
            GatewayEventKind::Unknown => Ok(Plan::ignored(event, "unhandled event type", now)),
        }
    }

    fn sync_plan(
        &self,
        event: &GatewayEvent,
        mut record: EntitlementRecord,
        snapshot: &SubscriptionSnapshot,
        now: Timestamp,
    ) -> Plan {
        let transition = record.apply_subscription_snapshot(
            snapshot.status,
            snapshot.current_period_end,
            &snapshot.id,
            Some(&snapshot.customer_id),
            now,
        );
        record.set_cancel_at_period_end(snapshot.cancel_at_period_end, now);
        let change = with_transition_audit(
            EntitlementChange::new(record),
            &transition,
            AuditCause::GatewaySync,
            event,
            now,
        );
        Plan::applied(event, change, now)
    }

    async fn invoice_plan(
        &self,
        event: &GatewayEvent,
        invoice: &InvoiceSummary,
        status: PaymentStatus,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        if invoice.subscription_id.is_none() {
            return Ok(Plan::ignored(event, "invoice without subscription", now));
        }
        let record = self
            .resolve(event, invoice.subscription_id.as_deref(), &invoice.customer_id)
            .await?;
        let user_id = record.user_id.clone();
        let payment = PaymentLogEntry::from_invoice(user_id.clone(), invoice, status, now);

        let mut plan = Plan::applied(event, EntitlementChange::new(record).with_payment(payment), now);
        if status == PaymentStatus::Failed {
            plan.notification = Some(Notification::payment_failed(user_id, now));
        }
        Ok(plan)
    }

    /// Finds the owning record: metadata user id, then subscription, then customer.
    async fn resolve(
        &self,
        event: &GatewayEvent,
        subscription_id: Option<&str>,
        customer_id: &str,
    ) -> Result<EntitlementRecord, WebhookError> {
        if let Some(hint) = event.user_hint() {
            if let Ok(user_id) = UserId::new(hint) {
                if let Some(record) = self.repository.find_by_user_id(&user_id).await.map_err(storage)? {
                    return Ok(record);
                }
            }
        }
        if let Some(subscription_id) = subscription_id {
            if let Some(record) = self
                .repository
                .find_by_gateway_subscription_id(subscription_id)
                .await
                .map_err(storage)?
            {
                return Ok(record);
            }
        }
        if let Some(record) = self
            .repository
            .find_by_gateway_customer_id(customer_id)
            .await
            .map_err(storage)?
        {
            return Ok(record);
        }

        tracing::warn!(
            event_id = %event.id,
            customer_id,
            "Webhook references an unknown account"
        );
        Err(WebhookError::UnresolvedUser(customer_id.to_string()))
    }
}

fn with_transition_audit(
    change: EntitlementChange,
    transition: &Transition,
    cause: AuditCause,
    event: &GatewayEvent,
    now: Timestamp,
) -> EntitlementChange {
    if transition.is_noop() {
        return change;
    }
    let entry = AuditEntry::for_transition(change.record.user_id.clone(), transition, cause, now)
        .with_detail("event_id", event.id.clone())
        .with_detail("event_type", event.event_type.clone());
    change.with_audit(entry)
}

fn storage(e: DomainError) -> WebhookError {
    WebhookError::Storage(e.message)
}
