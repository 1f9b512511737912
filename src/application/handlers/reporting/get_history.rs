//! History queries: audit trail and payment log for one user.

use std::sync::Arc;

use crate::domain::billing::PaymentLogEntry;
use crate::domain::entitlement::{AuditEntry, EntitlementError};
use crate::domain::foundation::UserId;
use crate::ports::EntitlementReader;

#[derive(Debug, Clone)]
pub struct GetHistoryQuery {
    pub user_id: UserId,
}

/// Audit trail, oldest first.
pub struct GetAuditTrailHandler {
    reader: Arc<dyn EntitlementReader>,
}

impl GetAuditTrailHandler {
    pub fn new(reader: Arc<dyn EntitlementReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(&self, query: GetHistoryQuery) -> Result<Vec<AuditEntry>, EntitlementError> {
        Ok(self.reader.audit_trail(&query.user_id).await?)
    }
}

/// Payment log, oldest first.
pub struct GetPaymentHistoryHandler {
    reader: Arc<dyn EntitlementReader>,
}

impl GetPaymentHistoryHandler {
    pub fn new(reader: Arc<dyn EntitlementReader>) -> Self {
        Self { reader }
    }

    pub async fn handle(
        &self,
        query: GetHistoryQuery,
    ) -> Result<Vec<PaymentLogEntry>, EntitlementError> {
        Ok(self.reader.payment_history(&query.user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryEntitlementStore;

    #[tokio::test]
    async fn unknown_user_has_empty_history() {
        let store = Arc::new(InMemoryEntitlementStore::new());
        let query = GetHistoryQuery {
            user_id: UserId::new("ghost").unwrap(),
        };

        assert!(GetAuditTrailHandler::new(store.clone()).handle(query.clone()).await.unwrap().is_empty());
        assert!(GetPaymentHistoryHandler::new(store).handle(query).await.unwrap().is_empty());
    }
}
