//! Trial device bindings.

use crate::domain::foundation::{DeviceId, Timestamp, UserId};
use serde::Serialize;

/// Records that `user_id` started a trial from `device_id`.
///
/// One row per (device, user) pair; never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialDeviceBinding {
    pub device_id: DeviceId,
    pub user_id: UserId,
    pub created_at: Timestamp,
}

impl TrialDeviceBinding {
    pub fn new(device_id: DeviceId, user_id: UserId, created_at: Timestamp) -> Self {
        Self {
            device_id,
            user_id,
            created_at,
        }
    }
}
