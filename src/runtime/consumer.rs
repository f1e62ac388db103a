use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::EventEnvelope;
use crate::event_log::{EventLog, LogRecord};

use super::{Acknowledgment, ConsumerConfig, EventHandler, HandlerError};

/// Redelivery delay for the given attempt (0-based): exponential from
/// `base`, capped at `max`, with the upper half randomized.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 1u32 << attempt.min(16);
    let capped = base.saturating_mul(factor).min(max);
    let half = capped / 2;
    let jitter_ms = rand::thread_rng().gen_range(0..=half.as_millis() as u64);
    half + Duration::from_millis(jitter_ms)
}

struct Subscription {
    group: String,
    topic: String,
    handler: Arc<dyn EventHandler>,
}

/// Runs every registered subscription as one task per log partition.
pub struct ConsumerRuntime {
    log: Arc<dyn EventLog>,
    config: ConsumerConfig,
    subscriptions: Vec<Subscription>,
}

impl ConsumerRuntime {
    pub fn new(log: Arc<dyn EventLog>, config: ConsumerConfig) -> Self {
        Self {
            log,
            config,
            subscriptions: Vec::new(),
        }
    }

    /// Register `handler` as consumer group `group` on `topic`
    pub fn subscribe(
        mut self,
        group: impl Into<String>,
        topic: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        self.subscriptions.push(Subscription {
            group: group.into(),
            topic: topic.into(),
            handler,
        });
        self
    }

    /// Spawn the partition workers. Dropping the handle does not stop them;
    /// call [`RuntimeHandle::shutdown`].
    pub fn start(self) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        for sub in &self.subscriptions {
            tracing::info!(
                group = %sub.group,
                topic = %sub.topic,
                partitions = self.log.partitions(),
                "Starting consumer group"
            );

            for partition in 0..self.log.partitions() {
                let worker = PartitionWorker {
                    log: Arc::clone(&self.log),
                    config: self.config.clone(),
                    group: sub.group.clone(),
                    topic: sub.topic.clone(),
                    partition,
                    handler: Arc::clone(&sub.handler),
                    shutdown: shutdown_rx.clone(),
                };
                tasks.push(tokio::spawn(supervise(worker)));
            }
        }

        RuntimeHandle {
            shutdown: shutdown_tx,
            tasks,
        }
    }
}

/// Controls a started [`ConsumerRuntime`]
pub struct RuntimeHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RuntimeHandle {
    /// Signal every worker and wait for them to finish their current record
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Consumer worker panicked");
            }
        }
        tracing::info!("Consumer runtime stopped");
    }
}

/// Keep a partition worker alive. A panic inside the worker is logged and
/// the worker restarts, after a backoff, from the group's committed position.
async fn supervise(mut worker: PartitionWorker) {
    let mut restarts: u32 = 0;

    loop {
        match tokio::spawn(worker.clone().run()).await {
            Ok(()) => break,
            Err(e) if e.is_panic() => {
                let delay = worker.backoff(restarts);
                restarts = restarts.saturating_add(1);
                tracing::error!(
                    group = %worker.group,
                    topic = %worker.topic,
                    partition = worker.partition,
                    restarts = restarts,
                    delay_ms = delay.as_millis() as u64,
                    "Partition worker panicked; restarting"
                );
                if worker.wait(delay).await {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

/// What to do after delivering one record
enum Outcome {
    Advance,
    Redeliver,
}

#[derive(Clone)]
struct PartitionWorker {
    log: Arc<dyn EventLog>,
    config: ConsumerConfig,
    group: String,
    topic: String,
    partition: u32,
    handler: Arc<dyn EventHandler>,
    shutdown: watch::Receiver<bool>,
}

impl PartitionWorker {
    async fn run(mut self) {
        let mut attempt: u32 = 0;

        'poll: loop {
            if *self.shutdown.borrow() {
                break;
            }

            let batch = match self
                .log
                .fetch(&self.group, &self.topic, self.partition, self.config.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(
                        group = %self.group,
                        topic = %self.topic,
                        partition = self.partition,
                        error = %e,
                        "Fetch failed"
                    );
                    let delay = self.backoff(attempt);
                    attempt = attempt.saturating_add(1);
                    if self.wait(delay).await {
                        break;
                    }
                    continue;
                }
            };

            if batch.is_empty() {
                if self.wait(self.config.poll_interval).await {
                    break;
                }
                continue;
            }

            for record in batch {
                match self.deliver(&record).await {
                    Outcome::Advance => {
                        if let Err(e) = self
                            .log
                            .commit(&self.group, &self.topic, self.partition, record.offset)
                            .await
                        {
                            tracing::warn!(
                                group = %self.group,
                                offset = record.offset,
                                error = %e,
                                "Commit failed; record will be redelivered"
                            );
                            let delay = self.backoff(attempt);
                            attempt = attempt.saturating_add(1);
                            if self.wait(delay).await {
                                break 'poll;
                            }
                            continue 'poll;
                        }
                        attempt = 0;
                    }
                    Outcome::Redeliver => {
                        let delay = self.backoff(attempt);
                        attempt = attempt.saturating_add(1);
                        tracing::warn!(
                            group = %self.group,
                            topic = %self.topic,
                            partition = self.partition,
                            offset = record.offset,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Redelivering record"
                        );
                        if self.wait(delay).await {
                            break 'poll;
                        }
                        continue 'poll;
                    }
                }

                if *self.shutdown.borrow() {
                    break 'poll;
                }
            }
        }

        tracing::debug!(
            group = %self.group,
            topic = %self.topic,
            partition = self.partition,
            "Partition worker stopped"
        );
    }

    async fn deliver(&self, record: &LogRecord) -> Outcome {
        let envelope: EventEnvelope = match serde_json::from_value(record.payload.clone()) {
            Ok(envelope) => envelope,
            Err(e) => return self.park(record, HandlerError::Decode(e.to_string())).await,
        };

        let event_id = envelope.event_id;
        let ack = Acknowledgment::new();
        match self.handler.handle(envelope, &ack).await {
            Ok(()) if ack.is_acknowledged() => {
                tracing::debug!(
                    group = %self.group,
                    event_id = %event_id,
                    offset = record.offset,
                    "Event acknowledged"
                );
                Outcome::Advance
            }
            Ok(()) => {
                tracing::warn!(
                    group = %self.group,
                    event_id = %event_id,
                    "Handler returned without acknowledging"
                );
                Outcome::Redeliver
            }
            Err(e) if e.is_permanent() => self.park(record, e).await,
            Err(e) => {
                tracing::warn!(
                    group = %self.group,
                    event_id = %event_id,
                    error = %e,
                    "Handler failed"
                );
                Outcome::Redeliver
            }
        }
    }

    /// Dead-letter the record. If even that fails the record stays put.
    async fn park(&self, record: &LogRecord, error: HandlerError) -> Outcome {
        tracing::error!(
            group = %self.group,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            payload = %record.payload,
            error = %error,
            "Dead-lettering record"
        );

        match self
            .log
            .dead_letter(&self.group, record, &error.to_string())
            .await
        {
            Ok(()) => Outcome::Advance,
            Err(e) => {
                tracing::error!(group = %self.group, error = %e, "Dead-letter write failed");
                Outcome::Redeliver
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        backoff_delay(attempt, self.config.backoff_base, self.config.backoff_max)
    }

    /// Sleep for `delay` unless shutdown arrives first. Returns true on shutdown.
    async fn wait(&mut self, delay: Duration) -> bool {
        let closed = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            changed = self.shutdown.changed() => changed.is_err(),
        };
        closed || *self.shutdown.borrow()
    }
}
