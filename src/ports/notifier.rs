//! Notifier port.
//!
//! Fire-and-forget: callers log a failure and move on, so the
//! implementation only needs to get the message onto a queue.

use async_trait::async_trait;

use crate::domain::entitlement::Notification;
use crate::domain::foundation::DomainError;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Enqueue a notification for delivery.
    async fn notify(&self, notification: Notification) -> Result<(), DomainError>;
}
