//! Payment record
//!
//! A payment is created `pending` by the settlement service and moves exactly
//! once to a terminal status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{Amount, DomainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Transfer,
    Bill,
    Subscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Transfer => "transfer",
            PaymentType::Bill => "bill",
            PaymentType::Subscription => "subscription",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(PaymentType::Transfer),
            "bill" => Ok(PaymentType::Bill),
            "subscription" => Ok(PaymentType::Subscription),
            other => Err(format!("unknown payment type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub recipient_name: String,
    pub amount: Amount,
    pub currency: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

/// Everything needed to open a new pending transfer.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub user_id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub recipient_name: String,
    pub amount: Amount,
    pub currency: String,
    pub description: Option<String>,
}

impl Payment {
    /// Open a pending transfer payment.
    pub fn pending_transfer(new: NewTransfer) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            recipient_name: new.recipient_name,
            amount: new.amount,
            currency: new.currency,
            payment_type: PaymentType::Transfer,
            status: PaymentStatus::Pending,
            description: new.description,
            created_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Completed)?;
        self.completed_at = Some(at);
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Cancelled)
    }

    fn transition(&mut self, to: PaymentStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() || !to.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
