//! Per-operation sync bookkeeping.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::operation::OperationKind;

/// Outcome of syncing one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Success,
    Failed,
    Retrying,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Retrying => "RETRYING",
        }
    }
}

/// Record of one operation's trip through the sync engine.
///
/// Records are emitted as structured log entries; they are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: OperationKind,
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecord {
    /// Start a pending record for an operation on one entity.
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        operation: OperationKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation,
            status: SyncStatus::Pending,
            error_message: None,
            retry_count: 0,
            last_retry_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the record as waiting for another attempt.
    pub fn mark_retrying(&mut self) {
        self.status = SyncStatus::Retrying;
        self.updated_at = Utc::now();
    }

    /// Mark the record failed and schedule the next attempt `retry_delay`
    /// from now.
    pub fn mark_failed(&mut self, error: impl Into<String>, retry_delay: Duration) {
        let now = Utc::now();
        let delay = chrono::Duration::from_std(retry_delay).unwrap_or_else(|_| chrono::Duration::zero());

        self.status = SyncStatus::Failed;
        self.error_message = Some(error.into());
        self.retry_count += 1;
        self.last_retry_at = Some(now);
        self.next_retry_at = Some(now.checked_add_signed(delay).unwrap_or(now));
        self.updated_at = now;
    }

    /// Mark the record failed for good. Nothing further is scheduled.
    pub fn mark_abandoned(&mut self, error: impl Into<String>) {
        self.status = SyncStatus::Failed;
        self.error_message = Some(error.into());
        self.next_retry_at = None;
        self.updated_at = Utc::now();
    }

    /// Mark the record successful, clearing any earlier failure.
    pub fn mark_success(&mut self) {
        self.status = SyncStatus::Success;
        self.error_message = None;
        self.last_retry_at = None;
        self.next_retry_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_pending() {
        let record = SyncRecord::new("categories", "c1", OperationKind::Create);

        assert_eq!(record.status, SyncStatus::Pending);
        assert_eq!(record.retry_count, 0);
        assert!(record.error_message.is_none());
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_mark_failed_schedules_next_retry() {
        let mut record = SyncRecord::new("categories", "c1", OperationKind::Update);

        record.mark_failed("store unavailable", Duration::from_secs(5));
        record.mark_failed("store unavailable", Duration::from_secs(10));

        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.error_message.as_deref(), Some("store unavailable"));

        let last = record.last_retry_at.unwrap();
        let next = record.next_retry_at.unwrap();
        assert_eq!(next - last, chrono::Duration::seconds(10));
    }

    #[test]
    fn test_mark_abandoned_schedules_nothing() {
        let mut record = SyncRecord::new("categories", "c1", OperationKind::Update);
        record.mark_failed("store unavailable", Duration::from_secs(5));

        record.mark_abandoned("retries exhausted");

        assert_eq!(record.status, SyncStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("retries exhausted"));
        assert!(record.next_retry_at.is_none());
        assert!(record.last_retry_at.is_some());
        assert_eq!(record.retry_count, 1);
    }

    #[test]
    fn test_mark_success_clears_failure() {
        let mut record = SyncRecord::new("categories", "c1", OperationKind::Delete);
        record.mark_failed("timeout", Duration::from_secs(1));

        record.mark_success();

        assert_eq!(record.status, SyncStatus::Success);
        assert!(record.error_message.is_none());
        assert!(record.last_retry_at.is_none());
        assert!(record.next_retry_at.is_none());
        assert_eq!(record.retry_count, 1);
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&SyncStatus::Retrying).unwrap(),
            "\"RETRYING\""
        );
        assert_eq!(SyncStatus::Failed.as_str(), "FAILED");
    }
}
