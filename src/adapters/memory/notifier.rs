use async_trait::async_trait;
use std::sync::Mutex;

use crate::domain::entitlement::Notification;
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::Notifier;

/// Notifier that keeps everything it was asked to send.
///
/// Can be told to fail so callers' "log and move on" path is exercised.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: Mutex::new(true),
        }
    }

    /// Notifications accepted so far, in order.
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: &UserId) -> Vec<Notification> {
        self.sent()
            .into_iter()
            .filter(|n| &n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), DomainError> {
        let fail = self.fail.lock().map(|f| *f).unwrap_or(false);
        if fail {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "notification queue unavailable",
            ));
        }
        self.sent
            .lock()
            .map_err(|_| DomainError::new(ErrorCode::InternalError, "notifier lock poisoned"))?
            .push(notification);
        Ok(())
    }
}
