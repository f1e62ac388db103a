//! Event Log Errors

/// Errors that can occur appending to or reading from the event log
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Partition outside `0..partitions`
    #[error("Partition {partition} out of range (log has {partitions})")]
    InvalidPartition { partition: u32, partitions: u32 },
}
