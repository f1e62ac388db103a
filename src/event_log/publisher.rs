use std::sync::Arc;

use crate::domain::EventEnvelope;

use super::{EventLog, EventLogError, LogRecord};

/// Serializes envelopes and appends them to the event log.
#[derive(Clone)]
pub struct EventPublisher {
    log: Arc<dyn EventLog>,
}

impl EventPublisher {
    pub fn new(log: Arc<dyn EventLog>) -> Self {
        Self { log }
    }

    /// Publish `envelope` on `topic`, ordered with every other record that
    /// shares `partition_key`. Returns once the log holds the record.
    pub async fn publish(
        &self,
        topic: &str,
        partition_key: &str,
        envelope: &EventEnvelope,
    ) -> Result<LogRecord, EventLogError> {
        let payload = serde_json::to_value(envelope)?;
        let record = self.log.append(topic, partition_key, payload).await?;

        tracing::info!(
            event_id = %envelope.event_id,
            event_type = envelope.event_type(),
            topic = topic,
            partition = record.partition,
            offset = record.offset,
            "Published event"
        );

        Ok(record)
    }

    /// Publish on the envelope's own topic, keyed by its subject id
    pub async fn publish_envelope(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<LogRecord, EventLogError> {
        self.publish(envelope.topic(), &envelope.partition_key(), envelope)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventPayload, PaymentCompleted, PAYMENT_COMPLETED_TOPIC};
    use crate::event_log::{partition_for, InMemoryEventLog};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_envelope_routes_by_subject() {
        let log = InMemoryEventLog::new(8);
        let publisher = EventPublisher::new(Arc::new(log.clone()));

        let payment_id = Uuid::new_v4();
        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            EventPayload::PaymentCompleted(PaymentCompleted {
                payment_id,
                account_id: Uuid::new_v4(),
                amount: dec!(3450),
                currency: "KRW".to_string(),
                merchant_name: "Kim".to_string(),
            }),
        );

        let record = publisher.publish_envelope(&envelope).await.unwrap();

        assert_eq!(record.topic, PAYMENT_COMPLETED_TOPIC);
        assert_eq!(record.key, payment_id.to_string());
        assert_eq!(record.partition, partition_for(&payment_id.to_string(), 8));

        let decoded: EventEnvelope = serde_json::from_value(record.payload).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(log.record_count(PAYMENT_COMPLETED_TOPIC).await, 1);
    }
}
