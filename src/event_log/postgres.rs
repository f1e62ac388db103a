use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{check_partition, partition_for, DeadLetter, EventLog, EventLogError, LogRecord};

type RecordRow = (String, i32, i64, String, serde_json::Value, DateTime<Utc>);

fn into_record(
    (topic, partition, offset, key, payload, appended_at): RecordRow,
) -> LogRecord {
    LogRecord {
        topic,
        partition: partition as u32,
        offset,
        key,
        payload,
        appended_at,
    }
}

/// Event log backed by the `event_log`, `consumer_offsets` and
/// `dead_letters` tables.
#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
    partitions: u32,
}

impl PgEventLog {
    pub fn new(pool: PgPool, partitions: u32) -> Self {
        Self {
            pool,
            partitions: partitions.max(1),
        }
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    fn partitions(&self) -> u32 {
        self.partitions
    }

    async fn append(
        &self,
        topic: &str,
        key: &str,
        payload: serde_json::Value,
    ) -> Result<LogRecord, EventLogError> {
        let partition = partition_for(key, self.partitions) as i32;

        let mut tx = self.pool.begin().await?;

        // Serialize appenders per (topic, partition) so offsets stay gapless
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), $2)")
            .bind(topic)
            .bind(partition)
            .execute(&mut *tx)
            .await?;

        let row: RecordRow = sqlx::query_as(
            r#"
            INSERT INTO event_log (topic, partition_no, log_offset, key, payload)
            SELECT $1, $2, COALESCE(MAX(log_offset) + 1, 0), $3, $4
            FROM event_log
            WHERE topic = $1 AND partition_no = $2
            RETURNING topic, partition_no, log_offset, key, payload, appended_at
            "#,
        )
        .bind(topic)
        .bind(partition)
        .bind(key)
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(into_record(row))
    }

    async fn fetch(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        max: usize,
    ) -> Result<Vec<LogRecord>, EventLogError> {
        check_partition(partition, self.partitions)?;

        let rows: Vec<RecordRow> = sqlx::query_as(
            r#"
            SELECT e.topic, e.partition_no, e.log_offset, e.key, e.payload, e.appended_at
            FROM event_log e
            WHERE e.topic = $2 AND e.partition_no = $3
              AND e.log_offset >= COALESCE(
                  (SELECT next_offset FROM consumer_offsets
                   WHERE group_id = $1 AND topic = $2 AND partition_no = $3),
                  0)
            ORDER BY e.log_offset ASC
            LIMIT $4
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_record).collect())
    }

    async fn commit(
        &self,
        group: &str,
        topic: &str,
        partition: u32,
        offset: i64,
    ) -> Result<(), EventLogError> {
        check_partition(partition, self.partitions)?;

        sqlx::query(
            r#"
            INSERT INTO consumer_offsets (group_id, topic, partition_no, next_offset)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (group_id, topic, partition_no) DO UPDATE
                SET next_offset = GREATEST(consumer_offsets.next_offset, EXCLUDED.next_offset),
                    updated_at = NOW()
            "#,
        )
        .bind(group)
        .bind(topic)
        .bind(partition as i32)
        .bind(offset + 1)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dead_letter(
        &self,
        group: &str,
        record: &LogRecord,
        reason: &str,
    ) -> Result<(), EventLogError> {
        let letter = DeadLetter::from_record(group, record, reason);

        sqlx::query(
            r#"
            INSERT INTO dead_letters (
                id, group_id, topic, partition_no, log_offset, key, payload, reason, failed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(letter.id)
        .bind(&letter.group)
        .bind(&letter.topic)
        .bind(letter.partition as i32)
        .bind(letter.offset)
        .bind(&letter.key)
        .bind(&letter.payload)
        .bind(&letter.reason)
        .bind(letter.failed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn dead_letters(&self, group: &str) -> Result<Vec<DeadLetter>, EventLogError> {
        let rows: Vec<(
            Uuid,
            String,
            String,
            i32,
            i64,
            String,
            serde_json::Value,
            String,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"
            SELECT id, group_id, topic, partition_no, log_offset, key, payload, reason, failed_at
            FROM dead_letters
            WHERE group_id = $1
            ORDER BY failed_at ASC
            "#,
        )
        .bind(group)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, group, topic, partition, offset, key, payload, reason, failed_at)| DeadLetter {
                    id,
                    group,
                    topic,
                    partition: partition as u32,
                    offset,
                    key,
                    payload,
                    reason,
                    failed_at,
                },
            )
            .collect())
    }
}
