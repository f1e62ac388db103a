//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod analysis;
pub mod context;
pub mod error;
pub mod events;
pub mod investment;
pub mod payment;

pub use amount::{Amount, AmountError, Balance};
pub use analysis::ConsumptionAnalysis;
pub use context::OperationContext;
pub use error::DomainError;
pub use events::{
    EventEnvelope, EventPayload, PaymentCompleted, TransactionDirection, TransactionRecorded,
    PAYMENT_COMPLETED_TOPIC, TRANSACTION_EVENTS_TOPIC,
};
pub use investment::{
    round_up, Investment, InvestmentAccount, InvestmentAccountType, InvestmentType, RoundUpConfig,
};
pub use payment::{NewTransfer, Payment, PaymentStatus, PaymentType};
