//! Event decoding.
//!
//! Turns raw change event bytes into a `CategoryOperation`.

mod envelope;

pub use envelope::{ChangeEnvelope, ChangePayload, SourceInfo};

use chrono::{DateTime, Utc};
use discovery_sync_shared::{Category, CategoryOperation, OperationKind};
use serde_json::Value;
use tracing::debug;

use crate::errors::SyncError;

/// Decodes change events for the category entity.
///
/// Decoding is pure: nothing here touches the store or the consumer.
#[derive(Debug, Clone, Default)]
pub struct EventDecoder;

impl EventDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode one change event.
    ///
    /// Creates and updates take the `after` image, deletes take the
    /// `before` image. The event time is the source commit timestamp,
    /// which must be present and positive.
    ///
    /// # Returns
    ///
    /// * `Ok(CategoryOperation)` - The decoded operation
    /// * `Err(SyncError::InvalidPayload)` - The bytes are not a change envelope,
    ///   or the source timestamp is absent or zero
    /// * `Err(SyncError::UnknownOperation)` - The operation code is not `c`, `u` or `d`
    /// * `Err(SyncError::DataTransform)` - The selected image is absent or malformed
    pub fn decode(&self, bytes: &[u8]) -> Result<CategoryOperation, SyncError> {
        let envelope: ChangeEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::invalid_payload(e.to_string()))?;
        let payload = envelope.payload;

        let operation = OperationKind::from_change_code(&payload.op)
            .ok_or_else(|| SyncError::unknown_operation(payload.op.clone()))?;

        let occurred_at = payload
            .source
            .as_ref()
            .and_then(|source| source.ts_ms)
            .filter(|ts_ms| *ts_ms > 0)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| SyncError::invalid_payload("event has no source timestamp"))?;

        let (side, image) = match operation {
            OperationKind::Delete => ("before", payload.before),
            OperationKind::Create | OperationKind::Update => ("after", payload.after),
        };
        let image = match image {
            Some(Value::Null) | None => {
                return Err(SyncError::data_transform(format!(
                    "{} event has no {} image",
                    operation, side
                )))
            }
            Some(image) => image,
        };

        let category: Category = serde_json::from_value(image)
            .map_err(|e| SyncError::data_transform(format!("{} image: {}", side, e)))?;

        debug!(
            operation = %operation,
            entity_id = %category.id,
            occurred_at = %occurred_at,
            "Decoded change event"
        );

        Ok(CategoryOperation::new(operation, category, occurred_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn envelope(op: &str, before: Value, after: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "payload": {
                "before": before,
                "after": after,
                "source": {
                    "version": "2.5.0.Final",
                    "connector": "postgresql",
                    "ts_ms": 1_744_100_000_000i64,
                    "db": "digital_discovery",
                    "schema": "public",
                    "table": "categories",
                    "txId": 771,
                    "lsn": 24023128
                },
                "op": op,
                "ts_ms": 1_744_100_000_500i64
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_create_uses_after_image() {
        let bytes = envelope(
            "c",
            Value::Null,
            json!({"id": "c1", "name": "Books", "status": 1, "version": 1}),
        );

        let op = EventDecoder::new().decode(&bytes).unwrap();

        assert_eq!(op.operation, OperationKind::Create);
        assert_eq!(op.payload.id, "c1");
        assert_eq!(op.payload.name, "Books");
        assert_eq!(
            op.occurred_at,
            Utc.timestamp_millis_opt(1_744_100_000_000).unwrap()
        );
    }

    #[test]
    fn test_decode_update_uses_after_image() {
        let bytes = envelope(
            "u",
            json!({"id": "c1", "name": "Books"}),
            json!({"id": "c1", "name": "Books v2", "description": "Updated"}),
        );

        let op = EventDecoder::new().decode(&bytes).unwrap();

        assert_eq!(op.operation, OperationKind::Update);
        assert_eq!(op.payload.name, "Books v2");
        assert_eq!(op.payload.description.as_deref(), Some("Updated"));
    }

    #[test]
    fn test_decode_delete_uses_before_image() {
        let bytes = envelope("d", json!({"id": "c2", "name": null}), Value::Null);

        let op = EventDecoder::new().decode(&bytes).unwrap();

        assert_eq!(op.operation, OperationKind::Delete);
        assert_eq!(op.payload.id, "c2");
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = EventDecoder::new().decode(b"not json at all").unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_envelope_without_payload() {
        let err = EventDecoder::new()
            .decode(br#"{"schema": {}, "data": {}}"#)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_unknown_operation() {
        let bytes = envelope("r", Value::Null, json!({"id": "c1", "name": "Books"}));

        let err = EventDecoder::new().decode(&bytes).unwrap_err();

        match err {
            SyncError::UnknownOperation(code) => assert_eq!(code, "r"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_missing_image() {
        let bytes = envelope("d", Value::Null, Value::Null);
        let err = EventDecoder::new().decode(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::DataTransform(_)));
    }

    #[test]
    fn test_decode_rejects_malformed_image() {
        let bytes = envelope("c", Value::Null, json!({"id": 17, "name": ["Books"]}));
        let err = EventDecoder::new().decode(&bytes).unwrap_err();
        assert!(matches!(err, SyncError::DataTransform(_)));
    }

    #[test]
    fn test_decode_rejects_missing_source_timestamp() {
        let bytes = serde_json::to_vec(&json!({
            "payload": {
                "after": {"id": "c1", "name": "Books"},
                "op": "c",
                "ts_ms": 1_744_100_000_500i64
            }
        }))
        .unwrap();

        let err = EventDecoder::new().decode(&bytes).unwrap_err();

        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }

    #[test]
    fn test_decode_rejects_zero_source_timestamp() {
        let bytes = serde_json::to_vec(&json!({
            "payload": {
                "after": {"id": "c1", "name": "Books"},
                "source": {"ts_ms": 0},
                "op": "c"
            }
        }))
        .unwrap();

        let err = EventDecoder::new().decode(&bytes).unwrap_err();

        assert!(matches!(err, SyncError::InvalidPayload(_)));
    }
}
