//! GetSubscriptionInfoHandler - Query handler for a user's subscription details.

use std::sync::Arc;
use std::time::Duration;

use crate::application::handlers::gateway_call::bounded;
use crate::domain::entitlement::EntitlementError;
use crate::domain::foundation::UserId;
use crate::ports::{EntitlementRepository, PaymentGateway, SubscriptionInfo};

#[derive(Debug, Clone)]
pub struct GetSubscriptionInfoQuery {
    pub user_id: UserId,
}

/// Reads subscription details from the gateway; `None` when the user has
/// never subscribed.
pub struct GetSubscriptionInfoHandler {
    repository: Arc<dyn EntitlementRepository>,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl GetSubscriptionInfoHandler {
    pub fn new(
        repository: Arc<dyn EntitlementRepository>,
        gateway: Arc<dyn PaymentGateway>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            gateway,
            gateway_timeout,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionInfoQuery,
    ) -> Result<Option<SubscriptionInfo>, EntitlementError> {
        let record = self
            .repository
            .find_by_user_id(&query.user_id)
            .await?
            .ok_or_else(|| EntitlementError::not_found(query.user_id.clone()))?;

        let Some(subscription_id) = record.gateway_subscription_id else {
            return Ok(None);
        };

        bounded(
            self.gateway_timeout,
            "get_subscription_info",
            self.gateway.get_subscription_info(&subscription_id),
        )
        .await
    }
}
