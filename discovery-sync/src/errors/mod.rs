//! Error types for the sync engine.
//!
//! `SyncError` is the closed taxonomy of per-operation failures. Callers
//! decide what to do with a failure through `class()` and `is_retryable()`,
//! never by inspecting messages. `ConsumerError` covers the consumer group
//! plumbing around the operations.

use discovery_sync_repository::IndexWriterError;
use thiserror::Error;

/// Failure class of a `SyncError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// The raw event could not be turned into an operation.
    Decode,
    /// The operation is structurally invalid.
    Validation,
    /// The store is unreachable, overloaded or too slow. Retryable.
    StoreUnavailable,
    /// The store reported a version conflict.
    Conflict,
    /// Retries ran out.
    RetryExhausted,
    /// Startup provisioning failed.
    Provisioning,
    /// Processing was aborted by shutdown.
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::StoreUnavailable => "store_unavailable",
            Self::Conflict => "conflict",
            Self::RetryExhausted => "retry_exhausted",
            Self::Provisioning => "provisioning",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors from decoding, dispatching and retrying one operation.
#[derive(Error, Debug, Clone)]
pub enum SyncError {
    /// The envelope is not valid JSON of the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The envelope carries an operation code other than `c`, `u` or `d`.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// The row snapshot is missing or does not match the entity schema.
    #[error("Data transform error: {0}")]
    DataTransform(String),

    /// The operation fails validation (missing id or name, negative status,
    /// or a document the store refused as malformed).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The store is unreachable, overloaded or timed out.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store reported a version conflict.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Every attempt failed; carries the last failure.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<SyncError>,
    },

    /// Creating templates, policies, indices or aliases failed.
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Processing was aborted before completing.
    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    pub fn unknown_operation(msg: impl Into<String>) -> Self {
        Self::UnknownOperation(msg.into())
    }

    pub fn data_transform(msg: impl Into<String>) -> Self {
        Self::DataTransform(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn retry_exhausted(attempts: u32, last_error: SyncError) -> Self {
        Self::RetryExhausted {
            attempts,
            last_error: Box::new(last_error),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidPayload(_) | Self::UnknownOperation(_) | Self::DataTransform(_) => {
                ErrorClass::Decode
            }
            Self::Validation(_) => ErrorClass::Validation,
            Self::StoreUnavailable(_) => ErrorClass::StoreUnavailable,
            Self::Conflict(_) => ErrorClass::Conflict,
            Self::RetryExhausted { .. } => ErrorClass::RetryExhausted,
            Self::Provisioning(_) => ErrorClass::Provisioning,
            Self::Cancelled => ErrorClass::Cancelled,
        }
    }

    /// Only transient store failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::StoreUnavailable
    }
}

impl From<IndexWriterError> for SyncError {
    fn from(err: IndexWriterError) -> Self {
        match err {
            IndexWriterError::Conflict(msg) => Self::Conflict(msg),
            IndexWriterError::ProvisioningError(msg) => Self::Provisioning(msg),
            IndexWriterError::Rejected { .. } | IndexWriterError::ValidationError(_) => {
                Self::Validation(err.to_string())
            }
            IndexWriterError::ConnectionError(_)
            | IndexWriterError::Timeout(_)
            | IndexWriterError::Unavailable { .. }
            | IndexWriterError::ParseError(_) => Self::StoreUnavailable(err.to_string()),
        }
    }
}

/// Errors from the consumer group plumbing.
#[derive(Error, Debug, Clone)]
pub enum ConsumerError {
    /// Error reported by the Kafka client while consuming.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// Joining the consumer group or subscribing failed.
    #[error("Subscribe error: {0}")]
    SubscribeError(String),

    /// Committing an offset failed.
    #[error("Commit error: {0}")]
    CommitError(String),

    /// Channel communication error.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl ConsumerError {
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }

    pub fn subscribe(msg: impl Into<String>) -> Self {
        Self::SubscribeError(msg.into())
    }

    pub fn commit(msg: impl Into<String>) -> Self {
        Self::CommitError(msg.into())
    }

    /// Fatal errors end the run; others are logged and consumption goes on.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SubscribeError(_) | Self::ChannelError(_))
    }
}

impl From<rdkafka::error::KafkaError> for ConsumerError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_decode_errors_share_a_class() {
        assert_eq!(SyncError::invalid_payload("x").class(), ErrorClass::Decode);
        assert_eq!(SyncError::unknown_operation("r").class(), ErrorClass::Decode);
        assert_eq!(SyncError::data_transform("x").class(), ErrorClass::Decode);
    }

    #[test]
    fn test_only_store_unavailable_is_retryable() {
        assert!(SyncError::store_unavailable("down").is_retryable());

        assert!(!SyncError::invalid_payload("x").is_retryable());
        assert!(!SyncError::validation("no id").is_retryable());
        assert!(!SyncError::Conflict("409".into()).is_retryable());
        assert!(!SyncError::retry_exhausted(3, SyncError::store_unavailable("down")).is_retryable());
        assert!(!SyncError::Provisioning("template".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_writer_errors_map_to_classes() {
        let cases = [
            (IndexWriterError::Timeout(Duration::from_secs(1)), ErrorClass::StoreUnavailable),
            (IndexWriterError::connection("refused"), ErrorClass::StoreUnavailable),
            (IndexWriterError::from_status(503, "busy"), ErrorClass::StoreUnavailable),
            (IndexWriterError::from_status(409, "conflict"), ErrorClass::Conflict),
            (IndexWriterError::from_status(400, "mapper"), ErrorClass::Validation),
            (IndexWriterError::provisioning("alias"), ErrorClass::Provisioning),
        ];

        for (err, class) in cases {
            assert_eq!(SyncError::from(err).class(), class);
        }
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error() {
        let err = SyncError::retry_exhausted(3, SyncError::store_unavailable("timeout"));

        match err {
            SyncError::RetryExhausted { attempts, last_error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, SyncError::StoreUnavailable(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_consumer_error_fatality() {
        assert!(ConsumerError::subscribe("no broker").is_fatal());
        assert!(!ConsumerError::kafka("broker transport failure").is_fatal());
        assert!(!ConsumerError::commit("rebalance in progress").is_fatal());
    }
}
