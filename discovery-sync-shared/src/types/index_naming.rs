//! Time-partitioned index naming.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Names the physical index and stable alias for one entity type.
///
/// Indices are partitioned by calendar month:
/// `{environment}-{service}-{entity}-{yyyy-MM}`. Readers go through the
/// alias `{environment}-{service}-{entity}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexNaming {
    pub environment: String,
    pub service: String,
    pub entity: String,
    pub date: DateTime<Utc>,
}

impl IndexNaming {
    pub fn new(
        environment: impl Into<String>,
        service: impl Into<String>,
        entity: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            environment: environment.into(),
            service: service.into(),
            entity: entity.into(),
            date,
        }
    }

    /// Physical index name for the month of `date`.
    ///
    /// # Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use discovery_sync_shared::IndexNaming;
    ///
    /// let date = Utc.with_ymd_and_hms(2025, 4, 15, 0, 0, 0).unwrap();
    /// let naming = IndexNaming::new("prod", "digital-discovery", "categories", date);
    /// assert_eq!(naming.index_name(), "prod-digital-discovery-categories-2025-04");
    /// ```
    pub fn index_name(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.environment,
            self.service,
            self.entity,
            self.date.format("%Y-%m")
        )
    }

    /// Stable alias spanning all monthly indices of this entity.
    pub fn alias_name(&self) -> String {
        format!("{}-{}-{}", self.environment, self.service, self.entity)
    }

    /// Wildcard matching this environment's monthly indices.
    pub fn index_pattern(&self) -> String {
        format!("{}-*", self.alias_name())
    }

    /// Wildcard matching the entity's monthly indices in every environment.
    pub fn template_pattern(&self) -> String {
        format!("*-{}-{}-*", self.service, self.entity)
    }
}
