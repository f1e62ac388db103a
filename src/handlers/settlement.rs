//! Settlement rails
//!
//! The rail moves the money. It is synchronous and all-or-nothing: either the
//! transfer happened or it did not.

use async_trait::async_trait;

use crate::domain::Payment;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SettlementError {
    #[error("Rejected by settlement rail: {0}")]
    Rejected(String),

    #[error("Settlement rail unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait SettlementRail: Send + Sync {
    async fn settle(&self, payment: &Payment) -> Result<(), SettlementError>;
}

/// Rail that settles every transfer immediately
#[derive(Debug, Clone, Copy, Default)]
pub struct InstantSettlement;

#[async_trait]
impl SettlementRail for InstantSettlement {
    async fn settle(&self, payment: &Payment) -> Result<(), SettlementError> {
        tracing::debug!(payment_id = %payment.id, "Settled instantly");
        Ok(())
    }
}
