use async_trait::async_trait;

use crate::domain::entitlement::Notification;
use crate::domain::foundation::DomainError;
use crate::ports::Notifier;

/// Logs notifications instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), DomainError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = notification.kind.as_str(),
            title = %notification.title,
            "Notification queued"
        );
        Ok(())
    }
}
