//! Per-partition processing.

use std::ops::ControlFlow;
use std::sync::Arc;

use discovery_sync_shared::{OperationKind, SyncRecord};
use tokio::sync::mpsc;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::WorkerContext;
use crate::bulk::BulkBuffer;
use crate::config::WriteMode;
use crate::consumer::ChangeMessage;
use crate::dispatcher::validate_operation;
use crate::errors::SyncError;
use crate::retry::RetryHistory;

/// Processes the messages of one partition in order.
pub(super) struct PartitionWorker {
    ctx: Arc<WorkerContext>,
    topic: String,
    partition: i32,
    bulk: Option<Arc<BulkBuffer>>,
    /// Highest offset processed but not yet committed.
    uncommitted: Option<i64>,
}

impl PartitionWorker {
    pub fn new(ctx: Arc<WorkerContext>, topic: String, partition: i32) -> Self {
        let bulk = (ctx.config.write_mode == WriteMode::Bulk).then(|| {
            Arc::new(BulkBuffer::new(
                ctx.writer.clone(),
                ctx.namer.clone(),
                ctx.metrics.clone(),
                ctx.config.batch_size,
            )
            .with_flush_timeout(ctx.dispatcher.config().operation_timeout))
        });
        Self {
            ctx,
            topic,
            partition,
            bulk,
            uncommitted: None,
        }
    }

    pub async fn run(mut self, mut messages: mpsc::Receiver<ChangeMessage>, cancel: CancellationToken) {
        let mut flush_timer = match self.bulk {
            Some(_) => {
                let mut timer = interval(self.ctx.config.flush_interval);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
                // Skip the first tick immediately
                timer.tick().await;
                Some(timer)
            }
            None => None,
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Unflushed operations are re-read from the last committed offset.
                    info!(topic = %self.topic, partition = self.partition, "Partition worker stopping");
                    return;
                }
                message = messages.recv() => match message {
                    Some(message) => {
                        if self.handle(message, &cancel).await.is_break() {
                            return;
                        }
                    }
                    None => {
                        let _ = self.flush(&cancel).await;
                        debug!(topic = %self.topic, partition = self.partition, "Partition queue closed");
                        return;
                    }
                },
                _ = next_tick(&mut flush_timer) => {
                    if self.flush(&cancel).await.is_break() {
                        return;
                    }
                }
            }
        }
    }

    /// Process one message. Breaks only when shutdown interrupted it.
    async fn handle(&mut self, message: ChangeMessage, cancel: &CancellationToken) -> ControlFlow<()> {
        self.ctx.restore_running();
        let offset = message.offset;

        if message.is_tombstone() {
            debug!(
                topic = %self.topic,
                partition = self.partition,
                offset,
                key = message.key_text().as_deref().unwrap_or_default(),
                "Skipping tombstone"
            );
            self.ctx.metrics.record_tombstone();
            self.processed(offset).await;
            return ControlFlow::Continue(());
        }

        let payload = message.payload.as_deref().unwrap_or_default();
        let op = match self.ctx.decoder.decode(payload) {
            Ok(op) => op,
            Err(e) => {
                self.ctx.metrics.record_error(&e);
                error!(
                    topic = %self.topic,
                    partition = self.partition,
                    offset,
                    key = message.key_text().as_deref().unwrap_or_default(),
                    payload_bytes = message.payload_len(),
                    error_class = e.class().as_str(),
                    error = %e,
                    "Failed to decode change event"
                );
                self.processed(offset).await;
                return ControlFlow::Continue(());
            }
        };

        let Some(buffer) = self.bulk.clone() else {
            return match self.ctx.dispatcher.dispatch(&op, cancel).await {
                Err(SyncError::Cancelled) => ControlFlow::Break(()),
                Ok(_) => {
                    self.processed(offset).await;
                    ControlFlow::Continue(())
                }
                Err(e) => {
                    // Terminal failure; the record is already logged.
                    warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        offset,
                        operation = %op.operation,
                        entity_id = %op.entity_id(),
                        error = %e,
                        "Acknowledging failed operation"
                    );
                    self.processed(offset).await;
                    ControlFlow::Continue(())
                }
            };
        };

        if let Err(e) = validate_operation(&op) {
            self.ctx.metrics.record_error(&e);
            error!(
                topic = %self.topic,
                partition = self.partition,
                offset,
                operation = %op.operation,
                entity_id = %op.entity_id(),
                error = %e,
                "Rejected invalid operation"
            );
            self.processed(offset).await;
            return ControlFlow::Continue(());
        }

        self.uncommitted = Some(offset);
        match buffer.add(op).await {
            Ok(Some(_)) => {
                self.commit_uncommitted();
                ControlFlow::Continue(())
            }
            Ok(None) => ControlFlow::Continue(()),
            Err(e) => self.recover_flush(&buffer, e, cancel).await,
        }
    }

    /// Mark `offset` processed. It is committed at once unless buffered
    /// operations before it still wait for a flush.
    async fn processed(&mut self, offset: i64) {
        self.uncommitted = Some(offset);
        match &self.bulk {
            Some(buffer) if !buffer.is_empty().await => {}
            _ => self.commit_uncommitted(),
        }
    }

    async fn flush(&mut self, cancel: &CancellationToken) -> ControlFlow<()> {
        let Some(buffer) = self.bulk.clone() else {
            return ControlFlow::Continue(());
        };
        match buffer.flush().await {
            Ok(_) => {
                self.commit_uncommitted();
                ControlFlow::Continue(())
            }
            Err(e) => self.recover_flush(&buffer, e, cancel).await,
        }
    }

    /// Resubmit a failed batch through the retry engine. A batch that still
    /// fails is recorded as failed, dropped and acknowledged.
    async fn recover_flush(
        &mut self,
        buffer: &BulkBuffer,
        err: SyncError,
        cancel: &CancellationToken,
    ) -> ControlFlow<()> {
        let err = if err.is_retryable() {
            let kind = buffer
                .pending()
                .await
                .first()
                .map_or(OperationKind::Update, |op| op.operation);
            let mut history = RetryHistory::new(
                format!("{}-{}-batch", self.topic, self.partition),
                self.ctx.namer.entity(),
                kind,
            );
            let outcome = self
                .ctx
                .retry
                .run(&mut history, err, cancel, move || async move {
                    buffer.flush().await.map(|_| ())
                })
                .await;
            match outcome {
                Ok(()) => {
                    self.commit_uncommitted();
                    return ControlFlow::Continue(());
                }
                Err(SyncError::Cancelled) => return ControlFlow::Break(()),
                Err(e) => e,
            }
        } else {
            err
        };

        let dropped = buffer.discard().await;
        for op in &dropped {
            let mut record = SyncRecord::new(self.ctx.namer.entity(), op.entity_id(), op.operation);
            record.mark_abandoned(err.to_string());
            error!(
                record_id = %record.id,
                entity_type = %record.entity_type,
                entity_id = %record.entity_id,
                operation = %record.operation,
                status = record.status.as_str(),
                error_class = err.class().as_str(),
                error = %err,
                "Sync record finalized"
            );
        }
        warn!(
            topic = %self.topic,
            partition = self.partition,
            dropped = dropped.len(),
            error = %err,
            "Acknowledging failed batch"
        );
        self.commit_uncommitted();
        ControlFlow::Continue(())
    }

    fn commit_uncommitted(&mut self) {
        let Some(offset) = self.uncommitted.take() else {
            return;
        };
        match self.ctx.source.commit(&self.topic, self.partition, offset) {
            Ok(()) => {
                self.ctx.metrics.record_offset_committed();
                debug!(topic = %self.topic, partition = self.partition, offset, "Committed offset");
            }
            Err(e) => {
                // The message will be re-delivered; writes are idempotent.
                error!(
                    topic = %self.topic,
                    partition = self.partition,
                    offset,
                    error = %e,
                    "Failed to commit offset"
                );
            }
        }
    }
}

/// Next tick of the bulk flush timer. Never resolves without one.
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}
