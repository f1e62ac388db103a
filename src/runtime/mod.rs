//! Event Consumer Runtime
//!
//! Pulls records from the event log for a consumer group and hands them, one
//! at a time and in partition order, to an [`EventHandler`]. A record counts
//! as consumed only once the handler acknowledges it; anything else is
//! redelivered after a backoff or, for permanent faults, dead-lettered.

mod consumer;

pub use consumer::{backoff_delay, ConsumerRuntime, RuntimeHandle};

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::domain::EventEnvelope;
use crate::store::StoreError;

/// Handed to the handler with every delivery. Calling
/// [`Acknowledgment::acknowledge`] lets the group's position move past the
/// record once the handler returns `Ok`.
#[derive(Debug, Default)]
pub struct Acknowledgment {
    acknowledged: AtomicBool,
}

impl Acknowledgment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acknowledge(&self) {
        self.acknowledged.store(true, Ordering::Release);
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.load(Ordering::Acquire)
    }
}

/// Handler failure, classified by what the runtime should do with the record
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Redeliver after backoff
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Dead-letter and move on
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Payload could not be decoded into an envelope
    #[error("Undecodable event: {0}")]
    Decode(String),
}

impl HandlerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Integrity(_) | HandlerError::Decode(_))
    }
}

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        if e.is_permanent() {
            HandlerError::Integrity(e.to_string())
        } else {
            HandlerError::Transient(e.to_string())
        }
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Apply the envelope. Must be idempotent: the same envelope can arrive
    /// more than once.
    async fn handle(&self, envelope: EventEnvelope, ack: &Acknowledgment)
        -> Result<(), HandlerError>;
}

/// Polling and retry settings shared by every subscription of a runtime
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Sleep between polls of an idle partition
    pub poll_interval: Duration,
    /// Records fetched per poll
    pub batch_size: usize,
    /// First redelivery delay
    pub backoff_base: Duration,
    /// Upper bound on the redelivery delay
    pub backoff_max: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            batch_size: 16,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(30),
        }
    }
}
