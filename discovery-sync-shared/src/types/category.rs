//! Category document type.
//!
//! This is both the row shape carried by change events and the document
//! shape stored in the search index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::sync_record::SyncStatus;

/// A category as stored in the search index.
///
/// Change events sometimes carry `null` for columns that are not part of the
/// row's replica identity (most notably the `before` image of a delete), so
/// the scalar fields accept `null` and fall back to their defaults.
///
/// # Fields
///
/// - `id`: Document identifier, unique within the index
/// - `name`: Display name, required for creates and updates
/// - `description`: Optional description text
/// - `status`: Non-negative business status code
/// - `created_at` / `updated_at`: Source row timestamps
/// - `version`: Source row version
/// - `sync_status`: Outcome of the last sync of this document
/// - `last_sync`: When the document was last written by the sync engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Category {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl Category {
    /// Create a category with the required fields set.
    ///
    /// # Example
    ///
    /// ```
    /// use discovery_sync_shared::Category;
    ///
    /// let category = Category::new("c1", "Books");
    /// assert_eq!(category.status, 0);
    /// assert!(category.description.is_none());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the status code.
    pub fn with_status(mut self, status: i64) -> Self {
        self.status = status;
        self
    }

    /// Return a copy stamped as successfully synced at `now`.
    ///
    /// This is the shape written to the index for creates and updates.
    pub fn stamped(&self, now: DateTime<Utc>) -> Self {
        Self {
            sync_status: Some(SyncStatus::Success),
            last_sync: Some(now),
            ..self.clone()
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
