//! Index writer error types.
//!
//! Every failure of a call against the search store is reported through
//! `IndexWriterError`. The variants are chosen so that callers can decide
//! whether to retry without inspecting messages.

use std::time::Duration;

use thiserror::Error;

/// Errors from index writer operations.
#[derive(Debug, Clone, Error)]
pub enum IndexWriterError {
    /// The store could not be reached.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The call did not complete before its deadline.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The store answered with a transient failure (408, 429 or 5xx).
    #[error("Store unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// The store reported a version conflict (409).
    #[error("Version conflict: {0}")]
    Conflict(String),

    /// The store refused the request as malformed (other 4xx).
    #[error("Request rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A response body could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Creating templates, policies, indices or aliases failed.
    #[error("Provisioning error: {0}")]
    ProvisioningError(String),

    /// The caller passed arguments the writer cannot use.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl IndexWriterError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::ProvisioningError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Classify a non-success HTTP status returned by the store.
    ///
    /// # Arguments
    ///
    /// * `status` - The HTTP status code
    /// * `message` - The response body or a description of the failure
    ///
    /// # Returns
    ///
    /// * `Conflict` for 409
    /// * `Unavailable` for 408, 429 and every 5xx
    /// * `Rejected` for any other status
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            409 => Self::Conflict(message),
            408 | 429 | 500..=599 => Self::Unavailable { status, message },
            _ => Self::Rejected { status, message },
        }
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Writes are idempotent, so a call whose response could not be parsed
    /// is safe to repeat as well.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::Timeout(_)
                | Self::Unavailable { .. }
                | Self::ParseError(_)
        )
    }
}
