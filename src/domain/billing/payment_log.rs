//! Payment log entries written for invoice events.

use crate::domain::foundation::{EntryId, Timestamp, UserId, ValidationError};
use serde::Serialize;
use std::str::FromStr;

use super::InvoiceSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format("payment_status", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentLogEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    /// Money in minor units, never floats.
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub recorded_at: Timestamp,
}

impl PaymentLogEntry {
    pub fn from_invoice(
        user_id: UserId,
        invoice: &InvoiceSummary,
        status: PaymentStatus,
        recorded_at: Timestamp,
    ) -> Self {
        Self {
            id: EntryId::new(),
            user_id,
            invoice_id: invoice.id.clone(),
            subscription_id: invoice.subscription_id.clone(),
            amount_cents: invoice.amount_cents,
            currency: invoice.currency.to_lowercase(),
            status,
            recorded_at,
        }
    }
}
