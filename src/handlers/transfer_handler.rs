//! Transfer Handler
//!
//! Settles peer-to-peer transfers under a per-source-account lease and
//! publishes the outcome for downstream consumers.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    EventEnvelope, EventPayload, NewTransfer, OperationContext, Payment, PaymentCompleted,
    TransactionDirection, TransactionRecorded,
};
use crate::error::AppError;
use crate::event_log::EventPublisher;
use crate::lease::{LeaseGuard, LeaseManager};
use crate::store::PaymentStore;

use super::{SettlementRail, TransferCommand, TransferResult};

/// Category attached to every transaction event emitted for a transfer
pub const TRANSFER_CATEGORY: &str = "TRANSFER";

/// Lease key guarding one source account of one user
pub fn lease_key(user_id: Uuid, from_account_id: Uuid) -> String {
    format!("payment:lock:{}:{}", user_id, from_account_id)
}

// =========================================================================
// TransferHandler
// =========================================================================

/// Handler for peer-to-peer transfers
pub struct TransferHandler {
    leases: Arc<dyn LeaseManager>,
    payments: Arc<dyn PaymentStore>,
    publisher: EventPublisher,
    rail: Arc<dyn SettlementRail>,
    lease_ttl: Duration,
    currency: String,
}

impl TransferHandler {
    pub fn new(
        leases: Arc<dyn LeaseManager>,
        payments: Arc<dyn PaymentStore>,
        publisher: EventPublisher,
        rail: Arc<dyn SettlementRail>,
    ) -> Self {
        Self {
            leases,
            payments,
            publisher,
            rail,
            lease_ttl: Duration::from_secs(30),
            currency: "KRW".to_string(),
        }
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Execute the transfer command
    pub async fn execute(
        &self,
        command: TransferCommand,
        context: &OperationContext,
    ) -> Result<TransferResult, AppError> {
        let user_id = context
            .request_user_id
            .ok_or_else(|| AppError::MissingHeader("X-User-Id".to_string()))?;

        // Validation happens before any lease is taken
        let transfer = command.validate(user_id, &self.currency)?;

        tracing::info!(
            user_id = %user_id,
            from_account_id = %transfer.from_account_id,
            amount = %transfer.amount,
            "Processing transfer"
        );

        let key = lease_key(user_id, transfer.from_account_id);
        let guard = LeaseGuard::acquire(Arc::clone(&self.leases), &key, self.lease_ttl)
            .await?
            .ok_or_else(|| {
                tracing::warn!(lease_key = %key, "Transfer rejected: settlement in progress");
                AppError::SettlementInProgress
            })?;

        // On any early exit the guard schedules the release itself
        let outcome = self.settle(transfer, context.correlation_id).await;

        if let Err(e) = guard.release().await {
            tracing::warn!(lease_key = %key, error = %e, "Lease release failed; it will expire");
        }

        let payment = outcome?;
        tracing::info!(payment_id = %payment.id, "Payment completed");

        Ok(TransferResult::from_payment(
            &payment,
            Some("Payment completed successfully"),
        ))
    }

    async fn settle(
        &self,
        transfer: NewTransfer,
        correlation_id: Option<Uuid>,
    ) -> Result<Payment, AppError> {
        let mut payment = Payment::pending_transfer(transfer);
        self.payments.insert_payment(&payment).await?;

        if let Err(e) = self.rail.settle(&payment).await {
            let reason = e.to_string();
            payment.fail(reason.clone())?;
            self.payments.update_payment(&payment).await?;

            tracing::warn!(payment_id = %payment.id, reason = %reason, "Settlement failed");
            return Err(AppError::SettlementFailed {
                payment_id: payment.id,
                reason,
            });
        }

        payment.complete(Utc::now())?;
        self.payments.update_payment(&payment).await?;

        self.publish_outcome(&payment, correlation_id).await?;

        Ok(payment)
    }

    /// PaymentCompleted for investing, TransactionRecorded for spending analysis
    async fn publish_outcome(
        &self,
        payment: &Payment,
        correlation_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let completed = EventEnvelope::new(
            payment.user_id,
            correlation_id,
            EventPayload::PaymentCompleted(PaymentCompleted {
                payment_id: payment.id,
                account_id: payment.from_account_id,
                amount: payment.amount.value(),
                currency: payment.currency.clone(),
                merchant_name: payment.recipient_name.clone(),
            }),
        );
        self.publisher.publish_envelope(&completed).await?;

        let recorded = EventEnvelope::new(
            payment.user_id,
            correlation_id,
            EventPayload::TransactionRecorded(TransactionRecorded {
                transaction_id: payment.id,
                account_id: payment.from_account_id,
                amount: payment.amount.value(),
                currency: payment.currency.clone(),
                category: Some(TRANSFER_CATEGORY.to_string()),
                merchant_name: payment.recipient_name.clone(),
                direction: TransactionDirection::Debit,
                status: payment.status,
            }),
        );
        self.publisher.publish_envelope(&recorded).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_key_format() {
        let user = Uuid::nil();
        let account = Uuid::from_u128(1);
        assert_eq!(
            lease_key(user, account),
            format!("payment:lock:{}:{}", user, account)
        );
        assert!(lease_key(user, account).starts_with("payment:lock:"));
    }
}
