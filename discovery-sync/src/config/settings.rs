//! Environment-driven settings for the sync engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use discovery_sync_repository::{IndexSettings, LifecycleThresholds, WriterConfig};

use crate::dispatcher::DispatcherConfig;
use crate::retry::RetryPolicy;
use crate::IndexingError;

const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_SERVICE_NAME: &str = "digital-discovery";
const DEFAULT_ENTITY: &str = "categories";
const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";
const DEFAULT_KAFKA_GROUP_ID: &str = "digital-discovery-sync";
const DEFAULT_TOPIC_PREFIX: &str = "postgres.digital_discovery.public";
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_POLICY_NAME: &str = "digital-discovery-policy";

/// How the engine connects to the search store at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry on an interval until the store answers.
    Retry,
}

impl FromStr for ConnectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Ok(Self::FailFast),
            "retry" => Ok(Self::Retry),
            other => Err(format!("unknown connection mode '{}'", other)),
        }
    }
}

/// Which component moves change events into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// This engine consumes the topics and writes the store.
    Custom,
    /// A Kafka Connect sink does the writing; the engine only monitors it.
    KafkaConnect,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::KafkaConnect => "kafka-connect",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "custom" => Ok(Self::Custom),
            "kafka-connect" | "kafka_connect" => Ok(Self::KafkaConnect),
            other => Err(format!("unknown sync mode '{}'", other)),
        }
    }
}

/// How operations reach the store in custom mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// One request per operation.
    Single,
    /// Operations are buffered per partition and flushed in batches.
    Bulk,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "bulk" => Ok(Self::Bulk),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

/// Kafka consumer settings.
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    pub auto_offset_reset: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl KafkaSettings {
    /// SASL credentials, present only when both halves are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username.as_str(), password.as_str())),
            _ => None,
        }
    }
}

/// Kafka Connect sink being monitored in connector mode.
#[derive(Debug, Clone)]
pub struct ConnectorSettings {
    pub url: String,
    pub connector: String,
    pub poll_interval: Duration,
}

/// Everything the engine reads from its environment.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub environment: String,
    pub service: String,
    pub entity: String,
    pub kafka: KafkaSettings,
    pub writer: WriterConfig,
    pub index: IndexSettings,
    pub connection_mode: ConnectionMode,
    pub connection_retry_interval: Duration,
    pub sync_mode: SyncMode,
    pub write_mode: WriteMode,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry: RetryPolicy,
    pub dispatcher: DispatcherConfig,
    pub partition_queue_size: usize,
    pub connector: Option<ConnectorSettings>,
    pub ops_port: u16,
    pub metrics_report_interval: Duration,
    pub health_probe_interval: Duration,
}

impl SyncConfig {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`.
    ///
    /// Unset keys take their defaults. Keys that are set but do not parse
    /// are a configuration error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let environment = vars.string("APP_ENV", DEFAULT_ENVIRONMENT);
        let service = vars.string("SERVICE_NAME", DEFAULT_SERVICE_NAME);
        let entity = vars.string("SYNC_ENTITY", DEFAULT_ENTITY);

        let topic_prefix = vars.string("KAFKA_TOPIC_PREFIX", DEFAULT_TOPIC_PREFIX);
        let kafka = KafkaSettings {
            brokers: vars.string("KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS),
            group_id: vars.string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            topics: vec![format!("{}.{}", topic_prefix, entity)],
            auto_offset_reset: vars.string("KAFKA_AUTO_OFFSET_RESET", "earliest"),
            username: vars.optional("KAFKA_USERNAME"),
            password: vars.optional("KAFKA_PASSWORD"),
        };

        let hosts: Vec<String> = vars
            .string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL)
            .split(',')
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect();
        if hosts.is_empty() {
            return Err(IndexingError::config("OPENSEARCH_URL names no host"));
        }
        let writer = WriterConfig {
            hosts,
            username: vars.optional("OPENSEARCH_USERNAME"),
            password: vars.optional("OPENSEARCH_PASSWORD"),
            max_connections: vars.parse("OPENSEARCH_MAX_CONNS", 100)?,
            request_timeout: vars.secs("OPENSEARCH_REQUEST_TIMEOUT_SECS", 30)?,
        };

        let index = IndexSettings {
            number_of_shards: vars.parse("OPENSEARCH_SHARDS", 1)?,
            number_of_replicas: vars.parse("OPENSEARCH_REPLICAS", 1)?,
            policy_name: vars.string("LIFECYCLE_POLICY_NAME", DEFAULT_POLICY_NAME),
            lifecycle: LifecycleThresholds::default(),
        };

        let retry = RetryPolicy {
            max_attempts: vars.parse("SYNC_MAX_RETRIES", 3)?,
            base_delay: Duration::from_millis(vars.parse("SYNC_RETRY_DELAY_MS", 5_000)?),
            max_delay: Duration::from_millis(vars.parse("SYNC_MAX_RETRY_DELAY_MS", 3_600_000)?),
            backoff_factor: vars.parse("SYNC_BACKOFF_FACTOR", 2.0)?,
        };
        if retry.backoff_factor < 1.0 {
            return Err(IndexingError::config(
                "SYNC_BACKOFF_FACTOR must be at least 1.0",
            ));
        }

        let sync_mode: SyncMode = vars.parse("SYNC_MODE", SyncMode::Custom)?;
        let connector = match (
            vars.optional("KAFKA_CONNECT_URL"),
            vars.optional("KAFKA_CONNECT_CONNECTOR"),
        ) {
            (Some(url), Some(connector)) => Some(ConnectorSettings {
                url: url.trim_end_matches('/').to_string(),
                connector,
                poll_interval: Duration::from_secs(30),
            }),
            _ => None,
        };
        if sync_mode == SyncMode::KafkaConnect && connector.is_none() {
            return Err(IndexingError::config(
                "kafka-connect mode requires KAFKA_CONNECT_URL and KAFKA_CONNECT_CONNECTOR",
            ));
        }

        let batch_size: usize = vars.parse("SYNC_BATCH_SIZE", 100)?;
        let partition_queue_size: usize = vars.parse("SYNC_PARTITION_QUEUE_SIZE", 1_000)?;
        if batch_size == 0 || partition_queue_size == 0 {
            return Err(IndexingError::config(
                "SYNC_BATCH_SIZE and SYNC_PARTITION_QUEUE_SIZE must be positive",
            ));
        }

        Ok(Self {
            environment,
            service,
            entity,
            kafka,
            writer,
            index,
            connection_mode: vars.parse("OPENSEARCH_CONNECTION_MODE", ConnectionMode::Retry)?,
            connection_retry_interval: vars.secs("OPENSEARCH_RETRY_INTERVAL_SECS", 15)?,
            sync_mode,
            write_mode: vars.parse("SYNC_WRITE_MODE", WriteMode::Single)?,
            batch_size,
            flush_interval: vars.millis("SYNC_FLUSH_INTERVAL_MS", 1_000)?,
            retry,
            dispatcher: DispatcherConfig {
                operation_timeout: vars.secs("SYNC_OPERATION_TIMEOUT_SECS", 10)?,
            },
            partition_queue_size,
            connector,
            ops_port: vars.parse("OPS_PORT", 8082)?,
            metrics_report_interval: vars.secs("METRICS_REPORT_INTERVAL_SECS", 10)?,
            health_probe_interval: vars.secs("HEALTH_PROBE_INTERVAL_SECS", 15)?,
        })
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    /// A period in seconds. Zero is rejected; timers cannot tick at it.
    fn secs(&self, key: &str, default: u64) -> Result<Duration, IndexingError> {
        self.positive(key, default).map(Duration::from_secs)
    }

    fn millis(&self, key: &str, default: u64) -> Result<Duration, IndexingError> {
        self.positive(key, default).map(Duration::from_millis)
    }

    fn positive(&self, key: &str, default: u64) -> Result<u64, IndexingError> {
        match self.parse(key, default)? {
            0 => Err(IndexingError::config(format!("{} must be positive", key))),
            value => Ok(value),
        }
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, IndexingError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|e| IndexingError::config(format!("invalid {} '{}': {}", key, raw, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<SyncConfig, IndexingError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.environment, "development");
        assert_eq!(config.service, "digital-discovery");
        assert_eq!(config.entity, "categories");
        assert_eq!(
            config.kafka.topics,
            vec!["postgres.digital_discovery.public.categories".to_string()]
        );
        assert_eq!(config.kafka.group_id, "digital-discovery-sync");
        assert!(config.kafka.credentials().is_none());
        assert_eq!(config.writer.hosts, vec!["http://localhost:9200".to_string()]);
        assert_eq!(config.writer.max_connections, 100);
        assert_eq!(config.connection_mode, ConnectionMode::Retry);
        assert_eq!(config.sync_mode, SyncMode::Custom);
        assert_eq!(config.write_mode, WriteMode::Single);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(3600));
        assert_eq!(config.dispatcher.operation_timeout, Duration::from_secs(10));
        assert_eq!(config.ops_port, 8082);
        assert!(config.connector.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("APP_ENV", "prod"),
            ("OPENSEARCH_URL", "http://a:9200, http://b:9200"),
            ("OPENSEARCH_CONNECTION_MODE", "fail-fast"),
            ("SYNC_WRITE_MODE", "bulk"),
            ("SYNC_BATCH_SIZE", "250"),
            ("SYNC_MAX_RETRIES", "5"),
            ("KAFKA_USERNAME", "user"),
            ("KAFKA_PASSWORD", "secret"),
        ])
        .unwrap();

        assert_eq!(config.environment, "prod");
        assert_eq!(config.writer.hosts.len(), 2);
        assert_eq!(config.writer.hosts[1], "http://b:9200");
        assert_eq!(config.connection_mode, ConnectionMode::FailFast);
        assert_eq!(config.write_mode, WriteMode::Bulk);
        assert_eq!(config.batch_size, 250);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.kafka.credentials(), Some(("user", "secret")));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config_from(&[("SYNC_MAX_RETRIES", "three")]).is_err());
        assert!(config_from(&[("SYNC_WRITE_MODE", "streaming")]).is_err());
        assert!(config_from(&[("SYNC_BATCH_SIZE", "0")]).is_err());
        assert!(config_from(&[("SYNC_BACKOFF_FACTOR", "0.5")]).is_err());
    }

    #[test]
    fn test_zero_periods_are_rejected() {
        for key in [
            "SYNC_FLUSH_INTERVAL_MS",
            "METRICS_REPORT_INTERVAL_SECS",
            "HEALTH_PROBE_INTERVAL_SECS",
            "SYNC_OPERATION_TIMEOUT_SECS",
            "OPENSEARCH_REQUEST_TIMEOUT_SECS",
            "OPENSEARCH_RETRY_INTERVAL_SECS",
        ] {
            let err = config_from(&[(key, "0")]).unwrap_err();
            assert!(err.to_string().contains(key), "{key}: {err}");
        }

        let config = config_from(&[
            ("SYNC_FLUSH_INTERVAL_MS", "250"),
            ("HEALTH_PROBE_INTERVAL_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.health_probe_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_connector_mode_requires_connector() {
        assert!(config_from(&[("SYNC_MODE", "kafka-connect")]).is_err());

        let config = config_from(&[
            ("SYNC_MODE", "kafka-connect"),
            ("KAFKA_CONNECT_URL", "http://connect:8083/"),
            ("KAFKA_CONNECT_CONNECTOR", "categories-sink"),
        ])
        .unwrap();
        assert_eq!(config.sync_mode, SyncMode::KafkaConnect);
        let connector = config.connector.unwrap();
        assert_eq!(connector.url, "http://connect:8083");
        assert_eq!(connector.connector, "categories-sink");
    }
}
