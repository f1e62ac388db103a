//! Spending classification consumer
//!
//! Consumes `TransactionRecorded` and stores one consumption analysis per
//! transaction.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{ConsumptionAnalysis, EventEnvelope, EventPayload};
use crate::runtime::{Acknowledgment, EventHandler, HandlerError};
use crate::store::AnalysisStore;

use super::SpendingClassifier;

/// Consumer group name of the spending classifier
pub const SPENDING_GROUP: &str = "pfm-core-service";

pub struct SpendingClassifierHandler {
    store: Arc<dyn AnalysisStore>,
    classifier: Arc<dyn SpendingClassifier>,
}

impl SpendingClassifierHandler {
    pub fn new(store: Arc<dyn AnalysisStore>, classifier: Arc<dyn SpendingClassifier>) -> Self {
        Self { store, classifier }
    }
}

#[async_trait]
impl EventHandler for SpendingClassifierHandler {
    async fn handle(
        &self,
        envelope: EventEnvelope,
        ack: &Acknowledgment,
    ) -> Result<(), HandlerError> {
        let EventPayload::TransactionRecorded(event) = envelope.payload else {
            return Err(HandlerError::Integrity(format!(
                "{} is not a TransactionRecorded event",
                envelope.event_id
            )));
        };

        if self
            .store
            .find_analysis_by_transaction(event.transaction_id)
            .await?
            .is_some()
        {
            tracing::info!(transaction_id = %event.transaction_id, "Transaction already analyzed");
            ack.acknowledge();
            return Ok(());
        }

        let classification = self.classifier.classify(
            &event.merchant_name,
            event.category.as_deref(),
            event.amount,
        );

        let analysis = ConsumptionAnalysis {
            id: Uuid::new_v4(),
            user_id: envelope.user_id,
            transaction_id: event.transaction_id,
            is_anomalous: classification.is_anomalous(),
            category: classification.category,
            amount: event.amount,
            merchant_name: event.merchant_name,
            transaction_date: envelope.timestamp,
            anomaly_reason: classification.anomaly_reason,
            metadata: serde_json::json!({
                "original_category": event.category,
                "merchant_type": classification.merchant_type,
                "classifier": self.classifier.name(),
                "event_id": envelope.event_id,
            }),
            analyzed_at: Utc::now(),
        };

        if self.store.insert_analysis(&analysis).await? {
            if analysis.is_anomalous {
                tracing::warn!(
                    transaction_id = %analysis.transaction_id,
                    amount = %analysis.amount,
                    "Anomalous transaction"
                );
            }
            tracing::info!(
                transaction_id = %analysis.transaction_id,
                category = %analysis.category,
                "Transaction analyzed"
            );
        } else {
            tracing::info!(transaction_id = %analysis.transaction_id, "Transaction already analyzed");
        }

        ack.acknowledge();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::RuleBasedClassifier;
    use crate::domain::{PaymentStatus, TransactionDirection, TransactionRecorded};
    use crate::store::InMemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn handler(store: &InMemoryStore) -> SpendingClassifierHandler {
        SpendingClassifierHandler::new(
            Arc::new(store.clone()),
            Arc::new(RuleBasedClassifier::default()),
        )
    }

    fn transaction(merchant: &str, amount: Decimal, category: Option<&str>) -> EventEnvelope {
        EventEnvelope::new(
            Uuid::new_v4(),
            None,
            EventPayload::TransactionRecorded(TransactionRecorded {
                transaction_id: Uuid::new_v4(),
                account_id: Uuid::new_v4(),
                amount,
                currency: "KRW".to_string(),
                category: category.map(str::to_string),
                merchant_name: merchant.to_string(),
                direction: TransactionDirection::Debit,
                status: PaymentStatus::Completed,
            }),
        )
    }

    fn transaction_id(envelope: &EventEnvelope) -> Uuid {
        match &envelope.payload {
            EventPayload::TransactionRecorded(t) => t.transaction_id,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_records_classified_analysis() {
        let store = InMemoryStore::new();
        let envelope = transaction("cafe mart", dec!(150000), Some("TRANSFER"));
        let id = transaction_id(&envelope);

        let ack = Acknowledgment::new();
        handler(&store).handle(envelope.clone(), &ack).await.unwrap();
        assert!(ack.is_acknowledged());

        let analysis = store.find_analysis_by_transaction(id).await.unwrap().unwrap();
        assert_eq!(analysis.category, "FOOD");
        assert!(analysis.is_anomalous);
        assert_eq!(analysis.anomaly_reason.as_deref(), Some("Unusually large transaction"));
        assert_eq!(analysis.transaction_date, envelope.timestamp);
        assert_eq!(analysis.metadata["original_category"], "TRANSFER");
        assert_eq!(analysis.metadata["merchant_type"], "RETAIL");
    }

    #[tokio::test]
    async fn test_supplied_category_used_when_no_rule_matches() {
        let store = InMemoryStore::new();
        let envelope = transaction("Park Jiwoo", dec!(20000), Some("TRANSFER"));
        let id = transaction_id(&envelope);

        handler(&store)
            .handle(envelope, &Acknowledgment::new())
            .await
            .unwrap();

        let analysis = store.find_analysis_by_transaction(id).await.unwrap().unwrap();
        assert_eq!(analysis.category, "TRANSFER");
        assert!(!analysis.is_anomalous);
    }

    #[tokio::test]
    async fn test_redelivery_keeps_single_analysis() {
        let store = InMemoryStore::new();
        let envelope = transaction("Game Zone", dec!(5000), None);
        let id = transaction_id(&envelope);
        let handler = handler(&store);

        for _ in 0..2 {
            let ack = Acknowledgment::new();
            handler.handle(envelope.clone(), &ack).await.unwrap();
            assert!(ack.is_acknowledged());
        }

        let first = store.find_analysis_by_transaction(id).await.unwrap().unwrap();
        let all = store
            .analyses_between(
                envelope.user_id,
                envelope.timestamp - chrono::Duration::minutes(1),
                envelope.timestamp + chrono::Duration::minutes(1),
            )
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert_eq!(first.category, "ENTERTAINMENT");
    }
}
