//! Message types for the consumer.

/// One record read from a change topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    /// Record value. `None` or empty for tombstones.
    pub payload: Option<Vec<u8>>,
}

impl ChangeMessage {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64, payload: Option<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key: None,
            payload,
        }
    }

    /// Tombstones follow deletes and carry no value.
    pub fn is_tombstone(&self) -> bool {
        self.payload.as_ref().map_or(true, |payload| payload.is_empty())
    }

    pub fn payload_len(&self) -> usize {
        self.payload.as_ref().map_or(0, Vec::len)
    }

    /// Record key as text for logging. Debezium keys are JSON.
    pub fn key_text(&self) -> Option<String> {
        self.key
            .as_deref()
            .map(|key| String::from_utf8_lossy(key).into_owned())
    }
}
