//! Request and response types for index writer operations.

use discovery_sync_shared::OperationKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::IndexWriterError;

/// One operation of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub action: OperationKind,
    pub index: String,
    pub id: String,
    /// Document for creates, partial document for updates, absent for deletes.
    pub document: Option<Value>,
}

/// An ordered multi-operation request.
///
/// Operations are applied by the store in the order they were pushed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkRequest {
    items: Vec<BulkItem>,
}

impl BulkRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    /// Full document write, replacing any existing document.
    pub fn push_index(&mut self, index: impl Into<String>, id: impl Into<String>, document: Value) {
        self.items.push(BulkItem {
            action: OperationKind::Create,
            index: index.into(),
            id: id.into(),
            document: Some(document),
        });
    }

    /// Partial merge, creating the document when it does not exist.
    pub fn push_update(&mut self, index: impl Into<String>, id: impl Into<String>, partial: Value) {
        self.items.push(BulkItem {
            action: OperationKind::Update,
            index: index.into(),
            id: id.into(),
            document: Some(partial),
        });
    }

    pub fn push_delete(&mut self, index: impl Into<String>, id: impl Into<String>) {
        self.items.push(BulkItem {
            action: OperationKind::Delete,
            index: index.into(),
            id: id.into(),
            document: None,
        });
    }

    pub fn items(&self) -> &[BulkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Encode the request as bulk API lines.
    ///
    /// Every item produces an action line naming `_index` and `_id`. Creates
    /// and updates are followed by a body line; updates wrap their partial
    /// document as `{"doc": ..., "doc_as_upsert": true}`.
    pub fn lines(&self) -> Vec<Value> {
        let mut lines = Vec::with_capacity(self.items.len() * 2);
        for item in &self.items {
            let mut action = Map::new();
            action.insert(
                item.action.bulk_action().to_string(),
                json!({ "_index": item.index, "_id": item.id }),
            );
            lines.push(Value::Object(action));
            match (item.action, &item.document) {
                (OperationKind::Create, Some(document)) => lines.push(document.clone()),
                (OperationKind::Update, Some(partial)) => lines.push(json!({
                    "doc": partial,
                    "doc_as_upsert": true,
                })),
                _ => {}
            }
        }
        lines
    }
}

/// One failed item of a bulk response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub id: String,
    pub status: u16,
    pub reason: String,
}

impl BulkItemFailure {
    /// Whether resubmitting the item may succeed.
    pub fn is_retryable(&self) -> bool {
        IndexWriterError::from_status(self.status, "").is_retryable()
    }
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkSummary {
    /// Summary of a request the store accepted without item errors.
    pub fn all_succeeded(total: usize) -> Self {
        Self {
            total,
            succeeded: total,
            failures: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn has_retryable_failures(&self) -> bool {
        self.failures.iter().any(BulkItemFailure::is_retryable)
    }

    /// Build a summary from a bulk API response body.
    ///
    /// A delete that found nothing (404) counts as a success.
    ///
    /// # Arguments
    ///
    /// * `total` - Number of items that were submitted
    /// * `response` - The parsed response body
    pub fn from_response(total: usize, response: &Value) -> Result<Self, IndexWriterError> {
        if !response
            .get("errors")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Ok(Self::all_succeeded(total));
        }

        let items = response
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| IndexWriterError::parse("bulk response has errors but no items"))?;

        let mut failures = Vec::new();
        for item in items {
            let Some((action, result)) = item.as_object().and_then(|obj| obj.iter().next()) else {
                return Err(IndexWriterError::parse("bulk response item is not an object"));
            };
            let status = result.get("status").and_then(Value::as_u64).unwrap_or(0) as u16;
            if (200..300).contains(&status) || (action == "delete" && status == 404) {
                continue;
            }
            failures.push(BulkItemFailure {
                id: result
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status,
                reason: result
                    .get("error")
                    .map(|e| {
                        e.get("reason")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| e.to_string())
                    })
                    .unwrap_or_default(),
            });
        }

        Ok(Self {
            total,
            succeeded: total.saturating_sub(failures.len()),
            failures,
        })
    }
}

/// Cluster health as reported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealthStatus {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterHealth {
    pub cluster_name: String,
    pub status: ClusterHealthStatus,
    #[serde(default)]
    pub number_of_nodes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_for_each_action() {
        let mut request = BulkRequest::new();
        request.push_index("idx", "c1", json!({"id": "c1", "name": "Books"}));
        request.push_update("idx", "c2", json!({"id": "c2", "name": "Games"}));
        request.push_delete("idx", "c3");

        let lines = request.lines();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], json!({"index": {"_index": "idx", "_id": "c1"}}));
        assert_eq!(lines[1]["name"], "Books");
        assert_eq!(lines[2], json!({"update": {"_index": "idx", "_id": "c2"}}));
        assert_eq!(lines[3]["doc"]["name"], "Games");
        assert_eq!(lines[3]["doc_as_upsert"], true);
        assert_eq!(lines[4], json!({"delete": {"_index": "idx", "_id": "c3"}}));
    }

    #[test]
    fn test_summary_without_errors() {
        let response = json!({"took": 3, "errors": false, "items": []});
        let summary = BulkSummary::from_response(4, &response).unwrap();

        assert_eq!(summary, BulkSummary::all_succeeded(4));
    }

    #[test]
    fn test_summary_collects_item_failures() {
        let response = json!({
            "took": 3,
            "errors": true,
            "items": [
                {"index": {"_id": "c1", "status": 201}},
                {"update": {"_id": "c2", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "failed to parse"}}},
                {"delete": {"_id": "c3", "status": 404}},
                {"index": {"_id": "c4", "status": 429, "error": {"reason": "rejected execution"}}}
            ]
        });

        let summary = BulkSummary::from_response(4, &response).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.failures[0].id, "c2");
        assert_eq!(summary.failures[0].reason, "failed to parse");
        assert!(!summary.failures[0].is_retryable());
        assert!(summary.failures[1].is_retryable());
        assert!(summary.has_retryable_failures());
    }

    #[test]
    fn test_cluster_health_parses() {
        let health: ClusterHealth = serde_json::from_value(json!({
            "cluster_name": "search",
            "status": "yellow",
            "number_of_nodes": 1,
            "active_shards": 5
        }))
        .unwrap();

        assert_eq!(health.status, ClusterHealthStatus::Yellow);
        assert_eq!(health.number_of_nodes, 1);
    }
}
