//! Reconciliation scheduler configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SchedulerConfig {
    /// Start the background sweeps at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default = "default_hourly")]
    pub downgrade_interval_secs: u64,

    /// Delay before the first downgrade sweep after startup
    #[serde(default = "default_downgrade_startup_delay")]
    pub downgrade_startup_delay_secs: u64,

    #[serde(default = "default_hourly")]
    pub reminder_interval_secs: u64,

    /// Delay before the first reminder sweep after startup
    #[serde(default = "default_reminder_startup_delay")]
    pub reminder_startup_delay_secs: u64,

    /// Age after which webhook log rows are pruned
    #[serde(default = "default_retention_days")]
    pub webhook_log_retention_days: u32,
}

impl SchedulerConfig {
    pub fn downgrade_interval(&self) -> Duration {
        Duration::from_secs(self.downgrade_interval_secs)
    }

    pub fn downgrade_startup_delay(&self) -> Duration {
        Duration::from_secs(self.downgrade_startup_delay_secs)
    }

    pub fn reminder_interval(&self) -> Duration {
        Duration::from_secs(self.reminder_interval_secs)
    }

    pub fn reminder_startup_delay(&self) -> Duration {
        Duration::from_secs(self.reminder_startup_delay_secs)
    }

    /// Validate scheduler configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.downgrade_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("downgrade_interval_secs"));
        }
        if self.reminder_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval("reminder_interval_secs"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            downgrade_interval_secs: default_hourly(),
            downgrade_startup_delay_secs: default_downgrade_startup_delay(),
            reminder_interval_secs: default_hourly(),
            reminder_startup_delay_secs: default_reminder_startup_delay(),
            webhook_log_retention_days: default_retention_days(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_hourly() -> u64 {
    3600
}

fn default_downgrade_startup_delay() -> u64 {
    5
}

fn default_reminder_startup_delay() -> u64 {
    30
}

fn default_retention_days() -> u32 {
    90
}
