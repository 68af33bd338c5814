//! Index name resolution.

use chrono::{DateTime, Utc};
use discovery_sync_shared::IndexNaming;

/// Resolves the index an operation is written to.
///
/// Resolution uses the wall-clock time of the write, not the time of the
/// change event, so an event replayed after a month boundary lands in the
/// new month's index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexNamer {
    environment: String,
    service: String,
    entity: String,
}

impl IndexNamer {
    pub fn new(
        environment: impl Into<String>,
        service: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            environment: environment.into(),
            service: service.into(),
            entity: entity.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Full naming for the month containing `now`.
    pub fn naming_at(&self, now: DateTime<Utc>) -> IndexNaming {
        IndexNaming::new(&self.environment, &self.service, &self.entity, now)
    }

    pub fn index_name_at(&self, now: DateTime<Utc>) -> String {
        self.naming_at(now).index_name()
    }

    /// Index for writes happening right now.
    pub fn current_index(&self) -> String {
        self.index_name_at(Utc::now())
    }

    pub fn alias(&self) -> String {
        self.naming_at(Utc::now()).alias_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_index_follows_write_month() {
        let namer = IndexNamer::new("prod", "digital-discovery", "categories");

        let april = Utc.with_ymd_and_hms(2025, 4, 30, 23, 59, 59).unwrap();
        let may = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

        assert_eq!(
            namer.index_name_at(april),
            "prod-digital-discovery-categories-2025-04"
        );
        assert_eq!(
            namer.index_name_at(may),
            "prod-digital-discovery-categories-2025-05"
        );
    }

    #[test]
    fn test_alias_is_stable() {
        let namer = IndexNamer::new("staging", "digital-discovery", "categories");
        assert_eq!(namer.alias(), "staging-digital-discovery-categories");
    }
}
