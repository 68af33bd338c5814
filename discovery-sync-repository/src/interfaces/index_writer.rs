//! Index writer trait definition.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::IndexWriterError;
use crate::types::{BulkRequest, BulkSummary, ClusterHealth};

/// Abstracts the search store the engine writes to.
///
/// Every call carries a deadline. A call that does not finish in time fails
/// with `IndexWriterError::Timeout`, which is retryable. Implementations must
/// be safe for concurrent use by many partition workers.
///
/// # Idempotency
///
/// `index_document` replaces the whole document, `update_document` merges
/// and creates the document when missing, and `delete_document` treats a
/// missing document as success. Re-applying the same call therefore
/// converges to the same state, which is what makes at-least-once delivery
/// safe.
#[async_trait]
pub trait IndexWriter: Send + Sync {
    /// Write a full document, replacing any existing document with that id.
    ///
    /// # Arguments
    ///
    /// * `index` - Target index name
    /// * `id` - Document id
    /// * `document` - The complete document
    /// * `timeout` - Deadline for the call
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
        timeout: Duration,
    ) -> Result<(), IndexWriterError>;

    /// Merge `partial` into the document, creating it when absent.
    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
        timeout: Duration,
    ) -> Result<(), IndexWriterError>;

    /// Delete a document. A missing document is not an error.
    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        timeout: Duration,
    ) -> Result<(), IndexWriterError>;

    /// Submit an ordered multi-operation request.
    ///
    /// # Returns
    ///
    /// * `Ok(BulkSummary)` - The store accepted the request; item-level
    ///   failures are listed in the summary
    /// * `Err(IndexWriterError)` - The request as a whole failed
    async fn bulk(
        &self,
        request: &BulkRequest,
        timeout: Duration,
    ) -> Result<BulkSummary, IndexWriterError>;

    /// Run a query and return the matching documents' sources.
    async fn search(
        &self,
        index: &str,
        query: &Value,
        timeout: Duration,
    ) -> Result<Vec<Value>, IndexWriterError>;

    /// Check that the store answers at all.
    async fn ping(&self, timeout: Duration) -> Result<(), IndexWriterError>;

    /// Report cluster health. A red cluster is an error.
    async fn check_health(&self, timeout: Duration) -> Result<ClusterHealth, IndexWriterError>;

    async fn index_exists(&self, index: &str, timeout: Duration) -> Result<bool, IndexWriterError>;

    /// Install an index template unless one with that name exists.
    ///
    /// Returns `true` when the template was created by this call.
    async fn ensure_index_template(
        &self,
        name: &str,
        template: &Value,
        timeout: Duration,
    ) -> Result<bool, IndexWriterError>;

    /// Install a retention lifecycle policy unless one with that name exists.
    ///
    /// Returns `true` when the policy was created by this call.
    async fn ensure_lifecycle_policy(
        &self,
        name: &str,
        policy: &Value,
        timeout: Duration,
    ) -> Result<bool, IndexWriterError>;

    /// Create an index unless it exists.
    ///
    /// Returns `true` when the index was created by this call.
    async fn ensure_index(&self, index: &str, timeout: Duration) -> Result<bool, IndexWriterError>;

    /// Point `alias` at `index`. Adding an existing alias is a no-op.
    async fn ensure_alias(
        &self,
        index: &str,
        alias: &str,
        timeout: Duration,
    ) -> Result<(), IndexWriterError>;
}
