//! Configuration types for the index writer and index provisioning.

use std::time::Duration;

/// Connection settings for the search store.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Store endpoints. The first entry is used for the connection.
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Maximum number of requests in flight at once.
    pub max_connections: usize,
    /// Transport-level timeout applied to every request.
    pub request_timeout: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".to_string()],
            username: None,
            password: None,
            max_connections: 100,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl WriterConfig {
    /// Basic-auth credentials, when both parts are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Age thresholds of the retention lifecycle, in days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleThresholds {
    pub warm_after_days: u32,
    pub cold_after_days: u32,
    pub delete_after_days: u32,
}

impl Default for LifecycleThresholds {
    fn default() -> Self {
        Self {
            warm_after_days: 30,
            cold_after_days: 60,
            delete_after_days: 90,
        }
    }
}

/// Settings applied to every monthly index through the index template.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    pub policy_name: String,
    pub lifecycle: LifecycleThresholds,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            number_of_shards: 1,
            number_of_replicas: 1,
            policy_name: "digital-discovery-policy".to_string(),
            lifecycle: LifecycleThresholds::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_require_both_parts() {
        let mut config = WriterConfig::default();
        assert!(config.credentials().is_none());

        config.username = Some("admin".to_string());
        assert!(config.credentials().is_none());

        config.password = Some("secret".to_string());
        assert_eq!(config.credentials(), Some(("admin", "secret")));
    }
}
