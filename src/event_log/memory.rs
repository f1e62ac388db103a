use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{check_partition, partition_for, DeadLetter, EventLog, EventLogError, LogRecord};

type PartitionKey = (String, u32);
type PositionKey = (String, String, u32);

/// Event log held in process memory.
#[derive(Clone)]
pub struct InMemoryEventLog {
    partitions: u32,
    records: Arc<RwLock<HashMap<PartitionKey, Vec<LogRecord>>>>,
    positions: Arc<RwLock<HashMap<PositionKey, i64>>>,
    dead_letters: Arc<RwLock<Vec<DeadLetter>>>,
}

impl InMemoryEventLog {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            records: Arc::default(),
            positions: Arc::default(),
            dead_letters: Arc::default(),
        }
    }

    /// Total records appended to `topic` across all partitions
    pub async fn record_count(&self, topic: &str) -> usize {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|((t, _), _)| t == topic)
            .map(|(_, partition)| partition.len())
            .sum()
    }

    /// All records of `topic`, partition by partition
    pub async fn records(&self, topic: &str) -> Vec<LogRecord> {
        let records = self.records.read().await;
        let mut out: Vec<LogRecord> = records
            .iter()
            .filter(|((t, _), _)| t == topic)
            .flat_map(|(_, partition)| partition.iter().cloned())
            .collect();
        out.sort_by_key(|r| (r.partition, r.offset));
        out
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    async fn append(
        &self,
        topic: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<LogRecord, EventLogError> {
        let partition = partition_for(key, self.partitions);
        let mut records = self.records.write().await;
        let log = records.entry((topic.to_string(), partition)).or_default();

        let record = LogRecord {
            topic: topic.to_string(),
            partition,
            offset: log.len() as i64,
            key: key.to_string(),
            payload,
            appended_at: Utc::now(),
        };
        log.push(record.clone());
        Ok(record)
    }

    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        max: usize,
    ) -> Result<Vec<LogRecord>, EventLogError> {
        check_partition(partition, self.partitions)?;

        let start = self
            .positions
            .read()
            .await
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0);

        let records = self.records.read().await;
        Ok(records
            .get(&(topic.to_string(), partition))
            .map(|log| {
                log.iter()
                    .skip(start as usize)
                    .take(max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: i64,
    ) -> Result<(), EventLogError> {
        check_partition(partition, self.partitions)?;

        let mut positions = self.positions.write().await;
        let next = positions
            .entry((group.to_string(), topic.to_string(), partition))
            .or_insert(0);
        *next = (*next).max(offset + 1);
        Ok(())
    }

    async fn dead_letter(
        &self,
        group: &str,
        record: &LogRecord,
        reason: &str,
    ) -> Result<(), EventLogError> {
        self.dead_letters
            .write()
            .await
            .push(DeadLetter::from_record(group, record, reason));
        Ok(())
    }

    async fn dead_letters(&self, group: &str) -> Result<Vec<DeadLetter>, EventLogError> {
        Ok(self
            .dead_letters
            .read()
            .await
            .iter()
            .filter(|d| d.group == group)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_same_key_keeps_publish_order() {
        let log = InMemoryEventLog::new(4);
        for i in 0..5 {
            log.append("t", "key-1", json!({ "seq": i })).await.unwrap();
        }

        let partition = partition_for("key-1", 4);
        let fetched = log.fetch("g", "t", partition, 10).await.unwrap();
        let seqs: Vec<i64> = fetched
            .iter()
            .map(|r| r.payload["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        assert_eq!(fetched[4].offset, 4);
    }

    #[tokio::test]
    async fn test_groups_have_independent_positions() {
        let log = InMemoryEventLog::new(1);
        log.append("t", "k", json!(1)).await.unwrap();
        log.append("t", "k", json!(2)).await.unwrap();

        log.commit("a", "t", 0, 0).await.unwrap();

        let for_a = log.fetch("a", "t", 0, 10).await.unwrap();
        let for_b = log.fetch("b", "t", 0, 10).await.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].offset, 1);
        assert_eq!(for_b.len(), 2);
    }

    #[tokio::test]
    async fn test_uncommitted_records_are_fetched_again() {
        let log = InMemoryEventLog::new(1);
        log.append("t", "k", json!("x")).await.unwrap();

        let first = log.fetch("g", "t", 0, 10).await.unwrap();
        let second = log.fetch("g", "t", 0, 10).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_commit_never_moves_backwards() {
        let log = InMemoryEventLog::new(1);
        for i in 0..3 {
            log.append("t", "k", json!(i)).await.unwrap();
        }
        log.commit("g", "t", 0, 2).await.unwrap();
        log.commit("g", "t", 0, 0).await.unwrap();
        assert!(log.fetch("g", "t", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dead_letters_are_scoped_to_group() {
        let log = InMemoryEventLog::new(2);
        let record = log.append("t", "k", json!({})).await.unwrap();

        log.dead_letter("a", &record, "bad").await.unwrap();

        let parked = log.dead_letters("a").await.unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].reason, "bad");
        assert_eq!(parked[0].offset, record.offset);
        assert!(log.dead_letters("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_rejects_unknown_partition() {
        let log = InMemoryEventLog::new(2);
        assert!(matches!(
            log.fetch("g", "t", 2, 1).await,
            Err(EventLogError::InvalidPartition { .. })
        ));
    }
}
