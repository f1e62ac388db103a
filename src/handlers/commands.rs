//! Command definitions
//!
//! Commands represent intentions to change the system state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Amount, DomainError, NewTransfer, Payment};

// =========================================================================
// TransferCommand
// =========================================================================

/// Command to transfer money from one of the acting user's accounts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferCommand {
    #[serde(default)]
    pub from_account_id: Option<Uuid>,
    #[serde(default)]
    pub to_account_id: Option<Uuid>,
    #[serde(default)]
    pub recipient_name: String,
    /// Exact decimal; JSON numbers and strings are both accepted
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(
        from_account_id: Uuid,
        to_account_id: Uuid,
        recipient_name: impl Into<String>,
        amount: Decimal,
    ) -> Self {
        Self {
            from_account_id: Some(from_account_id),
            to_account_id: Some(to_account_id),
            recipient_name: recipient_name.into(),
            amount: Some(amount),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check every field and produce the payment to open for `user_id`
    pub fn validate(&self, user_id: Uuid, currency: &str) -> Result<NewTransfer, DomainError> {
        let from_account_id = self
            .from_account_id
            .ok_or(DomainError::MissingField("from_account_id"))?;
        let to_account_id = self
            .to_account_id
            .ok_or(DomainError::MissingField("to_account_id"))?;

        let recipient_name = self.recipient_name.trim();
        if recipient_name.is_empty() {
            return Err(DomainError::MissingField("recipient_name"));
        }

        let amount = self.amount.ok_or(DomainError::MissingField("amount"))?;
        let amount = Amount::new(amount).map_err(|e| DomainError::InvalidAmount(e.to_string()))?;

        if from_account_id == to_account_id {
            return Err(DomainError::SameAccountTransfer);
        }

        Ok(NewTransfer {
            user_id,
            from_account_id,
            to_account_id,
            recipient_name: recipient_name.to_string(),
            amount,
            currency: currency.to_string(),
            description: self
                .description
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string),
        })
    }
}

// =========================================================================
// TransferResult
// =========================================================================

/// Payment as returned to API callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub payment_id: Uuid,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub recipient_name: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransferResult {
    pub fn from_payment(payment: &Payment, message: Option<&str>) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status.as_str().to_string(),
            amount: payment.amount.value(),
            currency: payment.currency.clone(),
            recipient_name: payment.recipient_name.clone(),
            created_at: payment.created_at,
            completed_at: payment.completed_at,
            message: message.map(str::to_string),
        }
    }
}
