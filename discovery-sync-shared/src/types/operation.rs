//! Normalized change operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::category::Category;

/// The kind of change applied to a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    /// All operation kinds, in a stable order.
    pub const ALL: [OperationKind; 3] = [Self::Create, Self::Update, Self::Delete];

    /// Map a change-data-capture operation code to a kind.
    ///
    /// `c` is create, `u` is update and `d` is delete. Any other code
    /// (including snapshot reads) has no mapping.
    pub fn from_change_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(Self::Create),
            "u" => Some(Self::Update),
            "d" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Upper-case name used in logs, metrics labels and sync records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }

    /// Action name of this kind in a bulk request.
    pub fn bulk_action(&self) -> &'static str {
        match self {
            Self::Create => "index",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change event after decoding, ready to be applied to the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryOperation {
    pub operation: OperationKind,
    pub payload: Category,
    pub occurred_at: DateTime<Utc>,
}

impl CategoryOperation {
    pub fn new(operation: OperationKind, payload: Category, occurred_at: DateTime<Utc>) -> Self {
        Self {
            operation,
            payload,
            occurred_at,
        }
    }

    pub fn create(payload: Category) -> Self {
        Self::new(OperationKind::Create, payload, Utc::now())
    }

    pub fn update(payload: Category) -> Self {
        Self::new(OperationKind::Update, payload, Utc::now())
    }

    pub fn delete(payload: Category) -> Self {
        Self::new(OperationKind::Delete, payload, Utc::now())
    }

    /// Identifier of the affected document.
    pub fn entity_id(&self) -> &str {
        &self.payload.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_change_code() {
        assert_eq!(OperationKind::from_change_code("c"), Some(OperationKind::Create));
        assert_eq!(OperationKind::from_change_code("u"), Some(OperationKind::Update));
        assert_eq!(OperationKind::from_change_code("d"), Some(OperationKind::Delete));
        assert_eq!(OperationKind::from_change_code("r"), None);
        assert_eq!(OperationKind::from_change_code(""), None);
        assert_eq!(OperationKind::from_change_code("C"), None);
    }

    #[test]
    fn test_bulk_action_names() {
        assert_eq!(OperationKind::Create.bulk_action(), "index");
        assert_eq!(OperationKind::Update.bulk_action(), "update");
        assert_eq!(OperationKind::Delete.bulk_action(), "delete");
    }

    #[test]
    fn test_serialized_kind_is_upper_case() {
        let json = serde_json::to_string(&OperationKind::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }

    #[test]
    fn test_entity_id() {
        let op = CategoryOperation::update(Category::new("c42", "Games"));
        assert_eq!(op.entity_id(), "c42");
        assert_eq!(op.operation, OperationKind::Update);
    }
}
