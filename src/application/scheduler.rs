//! Reconciliation scheduler.
//!
//! Runs the downgrade and reminder sweeps on fixed intervals until told to
//! stop. Each task waits a startup delay first so a freshly started process
//! settles before sweeping.
//!
//! ## Graceful Shutdown
//!
//! [`SchedulerHandle::shutdown`] signals both tasks and waits for them. A
//! sweep that is already running completes its batch before the task exits.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use super::service::EntitlementService;
use crate::config::SchedulerConfig;

pub struct ReconciliationScheduler {
    service: Arc<EntitlementService>,
    config: SchedulerConfig,
}

/// Handle to the running sweep tasks.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ReconciliationScheduler {
    pub fn new(service: Arc<EntitlementService>, config: SchedulerConfig) -> Self {
        Self { service, config }
    }

    /// Spawns the sweep tasks on the current runtime.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let downgrade = {
            let service = self.service.clone();
            let retention_days = self.config.webhook_log_retention_days;
            tokio::spawn(run_periodic(
                "downgrade",
                self.config.downgrade_startup_delay(),
                self.config.downgrade_interval(),
                shutdown_rx.clone(),
                move || {
                    let service = service.clone();
                    async move {
                        if let Err(e) = service.run_downgrade_sweep().await {
                            tracing::error!(error = %e.message(), "Downgrade sweep failed");
                        }
                        if let Err(e) = service.prune_webhook_log(retention_days).await {
                            tracing::error!(error = %e.message(), "Webhook log pruning failed");
                        }
                    }
                },
            ))
        };

        let reminders = {
            let service = self.service.clone();
            tokio::spawn(run_periodic(
                "reminder",
                self.config.reminder_startup_delay(),
                self.config.reminder_interval(),
                shutdown_rx,
                move || {
                    let service = service.clone();
                    async move {
                        if let Err(e) = service.run_reminder_sweep().await {
                            tracing::error!(error = %e.message(), "Reminder sweep failed");
                        }
                    }
                },
            ))
        };

        tracing::info!(
            downgrade_interval_secs = self.config.downgrade_interval_secs,
            reminder_interval_secs = self.config.reminder_interval_secs,
            "Reconciliation scheduler started"
        );

        SchedulerHandle {
            shutdown: shutdown_tx,
            tasks: vec![downgrade, reminders],
        }
    }
}

impl SchedulerHandle {
    /// Stops both tasks and waits for them to finish.
    pub async fn shutdown(self) {
        // Receivers only go away when the tasks have already exited
        let _ = self.shutdown.send(true);
        for result in futures::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Scheduler task panicked");
            }
        }
        tracing::info!("Reconciliation scheduler stopped");
    }
}

async fn run_periodic<F, Fut>(
    name: &'static str,
    startup_delay: Duration,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tokio::select! {
        _ = shutdown.changed() => return,
        _ = time::sleep(startup_delay) => {}
    }

    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::debug!(task = name, "Sweep task stopping");
                    return;
                }
            }
            _ = interval.tick() => {
                tracing::debug!(task = name, "Running sweep");
                tick().await;
            }
        }
    }
}
