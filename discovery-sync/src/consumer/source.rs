//! Change source trait definition.

use async_trait::async_trait;

use super::ChangeMessage;
use crate::errors::ConsumerError;

/// A consumer group member delivering change messages.
///
/// Implementations must be safe to share between the reading loop and the
/// partition workers that commit offsets.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Join the group and subscribe to the configured topics.
    fn subscribe(&self) -> Result<(), ConsumerError>;

    /// Wait for the next message.
    ///
    /// # Returns
    ///
    /// * `Some(Ok(message))` - A message was received
    /// * `Some(Err(e))` - The client reported an error; consumption may go on
    ///   unless `e.is_fatal()`
    /// * `None` - The source is exhausted
    async fn next_message(&self) -> Option<Result<ChangeMessage, ConsumerError>>;

    /// Record `offset` as processed for `(topic, partition)`.
    ///
    /// The committed position is `offset + 1`, the next message to read.
    fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), ConsumerError>;
}
