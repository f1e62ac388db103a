//! Domain Events
//!
//! The envelope published for every settlement outcome. Events are immutable
//! facts; `event_id` is the identity downstream consumers deduplicate on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentStatus;

/// Topic carrying [`PaymentCompleted`] events, keyed by payment id
pub const PAYMENT_COMPLETED_TOPIC: &str = "payment-completed";

/// Topic carrying [`TransactionRecorded`] events, keyed by transaction id
pub const TRANSACTION_EVENTS_TOPIC: &str = "transaction-events";

/// Wrapper around every published domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    pub user_id: Uuid,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    /// Wrap a payload with a fresh event id and timestamp.
    pub fn new(user_id: Uuid, correlation_id: Option<Uuid>, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id,
            user_id,
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Topic this envelope belongs on
    pub fn topic(&self) -> &'static str {
        match self.payload {
            EventPayload::PaymentCompleted(_) => PAYMENT_COMPLETED_TOPIC,
            EventPayload::TransactionRecorded(_) => TRANSACTION_EVENTS_TOPIC,
        }
    }

    /// Subject id used for ordering within a topic
    pub fn partition_key(&self) -> String {
        match &self.payload {
            EventPayload::PaymentCompleted(p) => p.payment_id.to_string(),
            EventPayload::TransactionRecorded(t) => t.transaction_id.to_string(),
        }
    }
}

/// Type-specific event body. Serialized inline with an `event_type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    PaymentCompleted(PaymentCompleted),
    TransactionRecorded(TransactionRecorded),
}

impl EventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::PaymentCompleted(_) => "PaymentCompleted",
            EventPayload::TransactionRecorded(_) => "TransactionRecorded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    pub payment_id: Uuid,
    /// Source account the payment was drawn from
    pub account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub merchant_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionDirection {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecorded {
    pub transaction_id: Uuid,
    pub account_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub category: Option<String>,
    pub merchant_name: String,
    pub direction: TransactionDirection,
    pub status: PaymentStatus,
}
