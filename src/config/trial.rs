//! Trial policy configuration

use serde::Deserialize;

use super::error::ValidationError;
use crate::domain::entitlement::EligibilityPolicy;

/// Trial configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrialConfig {
    /// Length of a new trial in days
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,

    /// Used trials allowed per email address
    #[serde(default = "default_max_trials_per_email")]
    pub max_trials_per_email: u32,

    /// Trial starts allowed per device
    #[serde(default = "default_max_trials_per_device")]
    pub max_trials_per_device: u32,

    /// Allow operators to extend running trials
    #[serde(default = "default_true")]
    pub enable_extensions: bool,

    /// Largest single extension in days
    #[serde(default = "default_max_extension_days")]
    pub max_extension_days: u32,

    /// Lead times, in days before trial end, at which reminders go out
    #[serde(default = "default_reminder_days")]
    pub reminder_days: Vec<u32>,
}

impl TrialConfig {
    pub fn eligibility_policy(&self) -> EligibilityPolicy {
        EligibilityPolicy {
            max_trials_per_email: self.max_trials_per_email,
            max_trials_per_device: self.max_trials_per_device,
        }
    }

    /// Validate trial configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.duration_days == 0 {
            return Err(ValidationError::InvalidTrialLimit("duration_days"));
        }
        if self.max_trials_per_email == 0 {
            return Err(ValidationError::InvalidTrialLimit("max_trials_per_email"));
        }
        if self.max_trials_per_device == 0 {
            return Err(ValidationError::InvalidTrialLimit("max_trials_per_device"));
        }
        if self.max_extension_days == 0 {
            return Err(ValidationError::InvalidTrialLimit("max_extension_days"));
        }
        if let Some(day) = self
            .reminder_days
            .iter()
            .find(|day| **day == 0 || **day > self.duration_days)
        {
            return Err(ValidationError::InvalidReminderDay(*day));
        }
        Ok(())
    }
}

impl Default for TrialConfig {
    fn default() -> Self {
        Self {
            duration_days: default_duration_days(),
            max_trials_per_email: default_max_trials_per_email(),
            max_trials_per_device: default_max_trials_per_device(),
            enable_extensions: true,
            max_extension_days: default_max_extension_days(),
            reminder_days: default_reminder_days(),
        }
    }
}

fn default_duration_days() -> u32 {
    14
}

fn default_max_trials_per_email() -> u32 {
    1
}

fn default_max_trials_per_device() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_extension_days() -> u32 {
    30
}

fn default_reminder_days() -> Vec<u32> {
    vec![7, 3, 1]
}
