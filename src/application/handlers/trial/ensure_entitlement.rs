//! EnsureEntitlementHandler - Command handler creating the default record.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, EntitlementRecord};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementRepository;

/// Command to make sure a user has an entitlement record.
#[derive(Debug, Clone)]
pub struct EnsureEntitlementCommand {
    pub user_id: UserId,
    pub email: String,
}

/// Handler run when a user is first seen (sign-up or first login).
///
/// Idempotent: an existing record is returned unchanged.
pub struct EnsureEntitlementHandler {
    repository: Arc<dyn EntitlementRepository>,
}

impl EnsureEntitlementHandler {
    pub fn new(repository: Arc<dyn EntitlementRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        cmd: EnsureEntitlementCommand,
    ) -> Result<EntitlementRecord, EntitlementError> {
        let email = cmd.email.trim();
        if email.is_empty() {
            return Err(EntitlementError::validation("email", "must not be empty"));
        }
        if !email.contains('@') {
            return Err(EntitlementError::validation("email", "must be an email address"));
        }

        let record = EntitlementRecord::new(cmd.user_id, email, Timestamp::now());
        let stored = self.repository.insert_if_absent(record).await?;
        Ok(stored)
    }
}
