//! # Discovery Sync
//!
//! Sync engine for the digital discovery service - consumes row-level change
//! events for categories from Kafka and applies them to OpenSearch.
//!
//! ## Architecture
//!
//! 1. **Consumer**: Reads change events per partition, in order
//! 2. **Decoder**: Turns an event envelope into a typed operation
//! 3. **Dispatcher**: Applies one operation to the current monthly index,
//!    retrying transient failures
//! 4. **Bulk buffer**: Batches operations per partition in bulk write mode
//! 5. **Runner**: Routes messages to partition workers and commits offsets
//!    once each message reached a terminal outcome
//!
//! Delivery is at-least-once. Writes are idempotent by entity id, so
//! redelivered events converge to the same store state.
//!
//! ## Modules
//!
//! - [`config`]: Settings and dependency initialization
//! - [`consumer`]: Change sources (Kafka)
//! - [`decoder`]: Change event decoding
//! - [`dispatcher`]: Operation validation and dispatch
//! - [`bulk`]: Bulk buffering
//! - [`retry`]: Backoff policy and retry engine
//! - [`runner`]: Consumer group runner and partition workers
//! - [`metrics`]: Counters, histograms and the progress reporter
//! - [`health`]: Last-known component health
//! - [`connect`]: Kafka Connect monitoring
//! - [`server`]: Operator HTTP endpoints
//! - [`errors`]: Error types for the engine

pub mod bulk;
pub mod config;
pub mod connect;
pub mod consumer;
pub mod decoder;
pub mod dispatcher;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod naming;
pub mod retry;
pub mod runner;
pub mod server;

pub use config::{Dependencies, SyncConfig};
pub use errors::{ConsumerError, SyncError};

use thiserror::Error;

/// Errors that can occur during engine initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Consumer group error.
    #[error("Consumer error: {0}")]
    Consumer(#[from] ConsumerError),

    /// Sync error.
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
