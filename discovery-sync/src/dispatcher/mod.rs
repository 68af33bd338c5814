//! Operation dispatch.
//!
//! Applies one decoded operation to the search store: validates it,
//! resolves the current index, performs the write for its kind, records
//! metrics for every attempt and hands retryable failures to the retry
//! engine.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use discovery_sync_repository::IndexWriter;
use discovery_sync_shared::{CategoryOperation, OperationKind, SyncRecord};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::errors::SyncError;
use crate::metrics::SyncMetrics;
use crate::naming::IndexNamer;
use crate::retry::{RetryEngine, RetryHistory};

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Deadline of a single write against the store.
    pub operation_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// Check an operation before it is written.
///
/// Every operation needs an id. Creates and updates also need a name, and
/// the status code may not be negative. Descriptions are optional.
pub fn validate_operation(op: &CategoryOperation) -> Result<(), SyncError> {
    if op.payload.id.trim().is_empty() {
        return Err(SyncError::validation("category id is required"));
    }
    if op.operation == OperationKind::Delete {
        return Ok(());
    }
    if op.payload.name.trim().is_empty() {
        return Err(SyncError::validation(format!(
            "category {} has no name",
            op.payload.id
        )));
    }
    if op.payload.status < 0 {
        return Err(SyncError::validation(format!(
            "category {} has negative status {}",
            op.payload.id, op.payload.status
        )));
    }
    Ok(())
}

/// Document body written for creates and updates.
pub(crate) fn document_for(op: &CategoryOperation) -> Result<Value, SyncError> {
    serde_json::to_value(op.payload.stamped(Utc::now()))
        .map_err(|e| SyncError::validation(format!("cannot serialize category: {}", e)))
}

/// Applies operations to the store one at a time.
pub struct OperationDispatcher {
    writer: Arc<dyn IndexWriter>,
    namer: IndexNamer,
    retry: RetryEngine,
    metrics: Arc<SyncMetrics>,
    config: DispatcherConfig,
}

impl OperationDispatcher {
    pub fn new(
        writer: Arc<dyn IndexWriter>,
        namer: IndexNamer,
        retry: RetryEngine,
        metrics: Arc<SyncMetrics>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            writer,
            namer,
            retry,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Apply one operation, retrying transient store failures.
    ///
    /// # Returns
    ///
    /// * `Ok(SyncRecord)` - The write took effect; the record is `SUCCESS`
    /// * `Err(SyncError::Validation)` - The operation was rejected; nothing was written
    /// * `Err(SyncError::Conflict)` - The store reported a version conflict
    /// * `Err(SyncError::RetryExhausted)` - Every attempt failed
    /// * `Err(SyncError::Cancelled)` - Shutdown interrupted the operation
    #[instrument(skip(self, op, cancel), fields(operation = %op.operation, entity_id = %op.entity_id()))]
    pub async fn dispatch(
        &self,
        op: &CategoryOperation,
        cancel: &CancellationToken,
    ) -> Result<SyncRecord, SyncError> {
        let mut record = SyncRecord::new(self.namer.entity(), op.entity_id(), op.operation);

        if let Err(err) = validate_operation(op) {
            self.metrics
                .record_operation(op.operation, Duration::ZERO, 0, Some(&err));
            return Err(self.finalize_failure(&mut record, err));
        }

        let err = match self.execute(op, cancel).await {
            Ok(()) => {
                record.mark_success();
                self.log_success(&record);
                return Ok(record);
            }
            Err(err) if err.is_retryable() => err,
            Err(err) => return Err(self.finalize_failure(&mut record, err)),
        };

        // The record announces the same wait the engine sleeps.
        let first_delay = self.retry.policy().delay(0);
        record.mark_failed(err.to_string(), first_delay);
        record.mark_retrying();
        debug!(
            entity_id = %record.entity_id,
            next_retry_at = ?record.next_retry_at,
            "Scheduling retry"
        );

        let mut history = RetryHistory::new(op.entity_id(), self.namer.entity(), op.operation);
        let outcome = self
            .retry
            .run_after(&mut history, err, first_delay, cancel, || self.execute(op, cancel))
            .await;
        record.retry_count += history.attempts.len() as u32;

        match outcome {
            Ok(()) => {
                record.mark_success();
                self.log_success(&record);
                Ok(record)
            }
            Err(err) => Err(self.finalize_failure(&mut record, err)),
        }
    }

    /// One attempt: resolve the index, write, record metrics.
    async fn execute(
        &self,
        op: &CategoryOperation,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let index = self.namer.current_index();
        let started = Instant::now();

        let (payload_bytes, result) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            outcome = self.apply(&index, op) => outcome,
        };

        self.metrics.record_operation(
            op.operation,
            started.elapsed(),
            payload_bytes,
            result.as_ref().err(),
        );
        result
    }

    async fn apply(&self, index: &str, op: &CategoryOperation) -> (usize, Result<(), SyncError>) {
        let id = op.entity_id();
        let timeout = self.config.operation_timeout;

        match op.operation {
            OperationKind::Create | OperationKind::Update => {
                let document = match document_for(op) {
                    Ok(document) => document,
                    Err(err) => return (0, Err(err)),
                };
                let payload_bytes = document.to_string().len();
                let result = if op.operation == OperationKind::Create {
                    self.writer.index_document(index, id, &document, timeout).await
                } else {
                    self.writer.update_document(index, id, &document, timeout).await
                };
                debug!(index = %index, entity_id = %id, payload_bytes, "Write attempted");
                (payload_bytes, result.map_err(SyncError::from))
            }
            OperationKind::Delete => {
                let payload_bytes = serde_json::to_string(&op.payload)
                    .map(|s| s.len())
                    .unwrap_or_default();
                let result = self.writer.delete_document(index, id, timeout).await;
                (payload_bytes, result.map_err(SyncError::from))
            }
        }
    }

    fn log_success(&self, record: &SyncRecord) {
        info!(
            record_id = %record.id,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            operation = %record.operation,
            status = record.status.as_str(),
            retry_count = record.retry_count,
            "Sync record finalized"
        );
    }

    /// Mark the record failed, log it and hand the error back.
    fn finalize_failure(&self, record: &mut SyncRecord, err: SyncError) -> SyncError {
        if matches!(err, SyncError::Cancelled) {
            debug!(entity_id = %record.entity_id, "Operation cancelled before completion");
            return err;
        }

        // Attempt-level errors are already counted.
        if matches!(err, SyncError::RetryExhausted { .. }) {
            self.metrics.record_error(&err);
        }
        record.mark_abandoned(err.to_string());
        error!(
            record_id = %record.id,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            operation = %record.operation,
            status = record.status.as_str(),
            retry_count = record.retry_count,
            error_class = err.class().as_str(),
            error = %err,
            "Sync record finalized"
        );
        err
    }
}
