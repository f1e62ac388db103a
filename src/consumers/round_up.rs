//! Round-up settlement
//!
//! Consumes `PaymentCompleted` and invests the spare change of each payment
//! into the user's configured investment account.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::domain::{round_up, Amount, EventEnvelope, EventPayload, Investment};
use crate::runtime::{Acknowledgment, EventHandler, HandlerError};
use crate::store::{InvestmentStore, RoundUpOutcome};

/// Consumer group name of the round-up handler
pub const ROUND_UP_GROUP: &str = "investment-service";

pub struct RoundUpHandler {
    store: Arc<dyn InvestmentStore>,
}

impl RoundUpHandler {
    pub fn new(store: Arc<dyn InvestmentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for RoundUpHandler {
    async fn handle(
        &self,
        envelope: EventEnvelope,
        ack: &Acknowledgment,
    ) -> Result<(), HandlerError> {
        let EventPayload::PaymentCompleted(event) = envelope.payload else {
            return Err(HandlerError::Integrity(format!(
                "{} is not a PaymentCompleted event",
                envelope.event_id
            )));
        };

        tracing::info!(
            event_id = %envelope.event_id,
            payment_id = %event.payment_id,
            correlation_id = ?envelope.correlation_id,
            "Processing round-up"
        );

        let config = match self
            .store
            .find_round_up_config(envelope.user_id, event.account_id)
            .await?
        {
            Some(config) if config.enabled => config,
            _ => {
                tracing::debug!(user_id = %envelope.user_id, "Round-up not enabled");
                ack.acknowledge();
                return Ok(());
            }
        };

        if event.amount <= Decimal::ZERO {
            return Err(HandlerError::Integrity(format!(
                "payment {} has non-positive amount {}",
                event.payment_id, event.amount
            )));
        }

        let spare = round_up(event.amount, &config.round_up_unit);
        if spare.is_zero() {
            tracing::debug!(amount = %event.amount, "No round-up needed");
            ack.acknowledge();
            return Ok(());
        }
        let spare = Amount::new(spare).map_err(|e| HandlerError::Integrity(e.to_string()))?;

        let account = self
            .store
            .get_investment_account(config.target_investment_account_id)
            .await?
            .ok_or_else(|| {
                HandlerError::Integrity(format!(
                    "investment account {} not found",
                    config.target_investment_account_id
                ))
            })?;

        if self
            .store
            .find_round_up_investment(event.payment_id, account.id)
            .await?
            .is_some()
        {
            tracing::info!(payment_id = %event.payment_id, "Round-up already applied");
            ack.acknowledge();
            return Ok(());
        }

        let investment = Investment::round_up(
            envelope.user_id,
            account.id,
            spare,
            event.currency,
            event.payment_id,
            Utc::now(),
        );

        match self.store.apply_round_up(&investment, config.id).await? {
            RoundUpOutcome::Applied => tracing::info!(
                payment_id = %event.payment_id,
                amount = %spare,
                account_id = %account.id,
                "Round-up invested"
            ),
            RoundUpOutcome::AlreadyApplied => {
                tracing::info!(payment_id = %event.payment_id, "Round-up already applied")
            }
        }

        ack.acknowledge();
        Ok(())
    }
}
