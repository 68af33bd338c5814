//! Consumer group runner.
//!
//! Reads change messages from a [`ChangeSource`] and routes each one to the
//! worker task owning its `(topic, partition)`. Workers process their
//! partition strictly in offset order and commit an offset only after the
//! message reached a terminal outcome. Different partitions are processed
//! in parallel.

mod partition_worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use discovery_sync_repository::IndexWriter;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::WriteMode;
use crate::consumer::{ChangeMessage, ChangeSource};
use crate::decoder::EventDecoder;
use crate::dispatcher::OperationDispatcher;
use crate::errors::ConsumerError;
use crate::metrics::SyncMetrics;
use crate::naming::IndexNamer;
use crate::retry::RetryEngine;

use partition_worker::PartitionWorker;

/// Lifecycle state of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Initialized,
    Starting,
    Running,
    Error,
    Stopped,
    Closed,
}

impl RunnerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "INITIALIZED",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Error => "ERROR",
            Self::Stopped => "STOPPED",
            Self::Closed => "CLOSED",
        }
    }
}

/// Runner settings.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub write_mode: WriteMode,
    pub batch_size: usize,
    /// Idle flush period of the bulk buffers.
    pub flush_interval: Duration,
    /// Capacity of each partition's queue. A full queue pauses reading.
    pub partition_queue_size: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            write_mode: WriteMode::Single,
            batch_size: 100,
            flush_interval: Duration::from_secs(1),
            partition_queue_size: 1_000,
        }
    }
}

/// State shared by the runner and its partition workers.
pub(crate) struct WorkerContext {
    pub source: Arc<dyn ChangeSource>,
    pub decoder: EventDecoder,
    pub dispatcher: OperationDispatcher,
    pub writer: Arc<dyn IndexWriter>,
    pub namer: IndexNamer,
    pub retry: RetryEngine,
    pub metrics: Arc<SyncMetrics>,
    pub status: watch::Sender<RunnerStatus>,
    pub config: RunnerConfig,
}

impl WorkerContext {
    /// Move from `Error` back to `Running` once messages flow again.
    pub fn restore_running(&self) {
        self.status.send_if_modified(|status| {
            if *status == RunnerStatus::Error {
                *status = RunnerStatus::Running;
                true
            } else {
                false
            }
        });
    }
}

/// Components the runner drives.
pub struct RunnerParts {
    pub source: Arc<dyn ChangeSource>,
    pub writer: Arc<dyn IndexWriter>,
    pub dispatcher: OperationDispatcher,
    pub namer: IndexNamer,
    pub retry: RetryEngine,
    pub metrics: Arc<SyncMetrics>,
}

type WorkerHandle = (mpsc::Sender<ChangeMessage>, JoinHandle<()>);

/// Drives one consumer group member.
pub struct ConsumerGroupRunner {
    ctx: Arc<WorkerContext>,
}

impl ConsumerGroupRunner {
    pub fn new(parts: RunnerParts, config: RunnerConfig) -> Self {
        let (status, _) = watch::channel(RunnerStatus::Initialized);
        Self {
            ctx: Arc::new(WorkerContext {
                source: parts.source,
                decoder: EventDecoder::new(),
                dispatcher: parts.dispatcher,
                writer: parts.writer,
                namer: parts.namer,
                retry: parts.retry,
                metrics: parts.metrics,
                status,
                config,
            }),
        }
    }

    /// Subscribe to status changes.
    pub fn status_receiver(&self) -> watch::Receiver<RunnerStatus> {
        self.ctx.status.subscribe()
    }

    /// Current status.
    pub fn health_check(&self) -> RunnerStatus {
        *self.ctx.status.borrow()
    }

    /// Consume until the source ends, a fatal error occurs or `cancel` fires.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The source was exhausted (`Closed`) or the run was
    ///   cancelled (`Stopped`)
    /// * `Err(ConsumerError)` - A fatal consumer error ended the run (`Error`)
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), ConsumerError> {
        self.ctx.status.send_replace(RunnerStatus::Starting);

        if let Err(e) = self.ctx.source.subscribe() {
            error!(error = %e, "Failed to subscribe");
            self.ctx.status.send_replace(RunnerStatus::Error);
            return Err(e);
        }

        self.ctx.status.send_replace(RunnerStatus::Running);
        info!(write_mode = ?self.ctx.config.write_mode, "Consumer group runner started");

        let (error_tx, error_rx) = mpsc::channel(64);
        let drain = tokio::spawn(drain_errors(self.ctx.clone(), error_rx));

        // Workers stop on their own token so a fatal error can end them too.
        let workers_cancel = cancel.child_token();
        let mut workers: HashMap<(String, i32), WorkerHandle> = HashMap::new();

        let (final_status, result) = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break (RunnerStatus::Stopped, Ok(())),
                next = self.ctx.source.next_message() => next,
            };

            let message = match next {
                None => {
                    info!("Change stream ended");
                    break (RunnerStatus::Closed, Ok(()));
                }
                Some(Err(e)) if e.is_fatal() => {
                    error!(error = %e, "Fatal consumer error");
                    workers_cancel.cancel();
                    break (RunnerStatus::Error, Err(e));
                }
                Some(Err(e)) => {
                    let _ = error_tx.send(e).await;
                    continue;
                }
                Some(Ok(message)) => message,
            };

            self.ctx.metrics.record_message_consumed();
            let key = (message.topic.clone(), message.partition);
            let sender = &workers
                .entry(key)
                .or_insert_with(|| self.spawn_worker(&message, workers_cancel.clone()))
                .0;

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => break (RunnerStatus::Stopped, Ok(())),
                sent = sender.send(message) => sent,
            };
            if let Err(e) = sent {
                error!(error = %e, "Partition worker is gone");
                workers_cancel.cancel();
                break (
                    RunnerStatus::Error,
                    Err(ConsumerError::ChannelError(e.to_string())),
                );
            }
        };

        // Closing the queues lets workers finish what they hold.
        let handles: Vec<_> = workers.into_values().map(|(_, handle)| handle).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Partition worker panicked");
            }
        }

        drop(error_tx);
        let _ = drain.await;

        self.ctx.status.send_replace(final_status);
        info!(status = final_status.as_str(), "Consumer group runner finished");
        result
    }

    fn spawn_worker(&self, first: &ChangeMessage, cancel: CancellationToken) -> WorkerHandle {
        let (tx, rx) = mpsc::channel(self.ctx.config.partition_queue_size);
        let worker = PartitionWorker::new(self.ctx.clone(), first.topic.clone(), first.partition);
        info!(topic = %first.topic, partition = first.partition, "Starting partition worker");
        (tx, tokio::spawn(worker.run(rx, cancel)))
    }
}

async fn drain_errors(ctx: Arc<WorkerContext>, mut errors: mpsc::Receiver<ConsumerError>) {
    while let Some(err) = errors.recv().await {
        warn!(error = %err, "Consumer error");
        ctx.status.send_replace(RunnerStatus::Error);
    }
}
