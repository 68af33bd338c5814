//! Bulk buffer.
//!
//! Accumulates operations and submits them to the store as one ordered
//! bulk request. Operations stay buffered until the store confirms the
//! batch, so a failed flush can be resubmitted without losing anything.

use std::sync::Arc;
use std::time::Duration;

use discovery_sync_repository::{BulkRequest, BulkSummary, IndexWriter};
use discovery_sync_shared::{CategoryOperation, OperationKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{document_for, validate_operation};
use crate::errors::SyncError;
use crate::metrics::SyncMetrics;
use crate::naming::IndexNamer;

/// Buffers operations for one partition and flushes them in batches.
pub struct BulkBuffer {
    pending: Mutex<Vec<CategoryOperation>>,
    writer: Arc<dyn IndexWriter>,
    namer: IndexNamer,
    metrics: Arc<SyncMetrics>,
    batch_size: usize,
    flush_timeout: Duration,
}

impl BulkBuffer {
    pub fn new(
        writer: Arc<dyn IndexWriter>,
        namer: IndexNamer,
        metrics: Arc<SyncMetrics>,
        batch_size: usize,
    ) -> Self {
        Self {
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            writer,
            namer,
            metrics,
            batch_size: batch_size.max(1),
            flush_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Validate and buffer an operation, flushing when the batch is full.
    ///
    /// The size check and the flush happen under the buffer lock, so
    /// concurrent adds that fill the batch cause exactly one flush.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(summary))` - The add filled the batch and it was flushed
    /// * `Ok(None)` - The operation was buffered
    /// * `Err(SyncError::Validation)` - The operation was rejected and not buffered
    /// * `Err(e)` - The triggered flush failed; every operation stays buffered
    pub async fn add(&self, op: CategoryOperation) -> Result<Option<BulkSummary>, SyncError> {
        validate_operation(&op)?;

        let mut pending = self.pending.lock().await;
        pending.push(op);
        if pending.len() < self.batch_size {
            return Ok(None);
        }

        debug!(batch_size = pending.len(), "Batch full, flushing");
        self.flush_locked(&mut pending).await.map(Some)
    }

    /// Submit everything buffered.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing was buffered
    /// * `Ok(Some(summary))` - The batch was accepted and the buffer cleared
    /// * `Err(e)` - The batch failed and stays buffered
    pub async fn flush(&self) -> Result<Option<BulkSummary>, SyncError> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return Ok(None);
        }
        self.flush_locked(&mut pending).await.map(Some)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Copy of the buffered operations, oldest first.
    pub async fn pending(&self) -> Vec<CategoryOperation> {
        self.pending.lock().await.clone()
    }

    /// Drop everything buffered and return it.
    pub async fn discard(&self) -> Vec<CategoryOperation> {
        std::mem::take(&mut *self.pending.lock().await)
    }

    async fn flush_locked(
        &self,
        pending: &mut Vec<CategoryOperation>,
    ) -> Result<BulkSummary, SyncError> {
        let index = self.namer.current_index();
        let request = encode(&index, pending)?;
        let batch_size = request.len();

        let summary = match self.writer.bulk(&request, self.flush_timeout).await {
            Ok(summary) => summary,
            Err(e) => {
                self.metrics.record_bulk(batch_size, true);
                let err = SyncError::from(e);
                self.metrics.record_error(&err);
                warn!(index = %index, batch_size, error = %err, "Bulk flush failed");
                return Err(err);
            }
        };

        if summary.has_retryable_failures() {
            self.metrics.record_bulk(batch_size, true);
            let err = SyncError::store_unavailable(format!(
                "{} of {} bulk items failed transiently",
                summary.failed(),
                summary.total
            ));
            self.metrics.record_error(&err);
            warn!(index = %index, batch_size, error = %err, "Bulk flush failed");
            return Err(err);
        }

        for failure in &summary.failures {
            let err = if failure.status == 409 {
                SyncError::Conflict(failure.reason.clone())
            } else {
                SyncError::validation(failure.reason.clone())
            };
            self.metrics.record_error(&err);
            error!(
                index = %index,
                entity_id = %failure.id,
                status = failure.status,
                error = %err,
                "Bulk item rejected"
            );
        }

        self.metrics.record_bulk(batch_size, false);
        pending.clear();

        info!(
            index = %index,
            batch_size,
            succeeded = summary.succeeded,
            failed = summary.failed(),
            "Bulk flush completed"
        );
        Ok(summary)
    }
}

/// Encode operations as one bulk request against `index`, preserving order.
pub fn encode(index: &str, ops: &[CategoryOperation]) -> Result<BulkRequest, SyncError> {
    let mut request = BulkRequest::with_capacity(ops.len());
    for op in ops {
        let id = op.entity_id();
        match op.operation {
            OperationKind::Create => request.push_index(index, id, document_for(op)?),
            OperationKind::Update => request.push_update(index, id, document_for(op)?),
            OperationKind::Delete => request.push_delete(index, id),
        }
    }
    Ok(request)
}
