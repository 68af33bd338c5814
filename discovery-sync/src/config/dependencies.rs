//! Dependency initialization and wiring for the sync engine.

use std::sync::Arc;
use std::time::Duration;

use discovery_sync_repository::{
    provision, IndexWriter, OpenSearchWriter, ProvisioningPlan, WriterConfig,
};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{ConnectionMode, SyncConfig, SyncMode};
use crate::consumer::KafkaChangeSource;
use crate::dispatcher::OperationDispatcher;
use crate::metrics::SyncMetrics;
use crate::naming::IndexNamer;
use crate::retry::RetryEngine;
use crate::runner::{ConsumerGroupRunner, RunnerConfig, RunnerParts};
use crate::IndexingError;

/// Deadline of each provisioning step and health check at startup.
const STARTUP_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Container for all initialized dependencies.
pub struct Dependencies {
    pub config: SyncConfig,
    pub metrics: Arc<SyncMetrics>,
    pub writer: Arc<dyn IndexWriter>,
    pub namer: IndexNamer,
    /// The consumer group runner; present in custom mode only.
    pub runner: Option<ConsumerGroupRunner>,
}

impl Dependencies {
    /// Connect to the store, provision the index resources and build the
    /// consumer side for the configured mode.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If initialization fails (connection failures
    ///   only in fail-fast mode)
    pub async fn new(config: SyncConfig, metrics: Arc<SyncMetrics>) -> Result<Self, IndexingError> {
        info!(
            environment = %config.environment,
            service = %config.service,
            entity = %config.entity,
            opensearch_hosts = ?config.writer.hosts,
            kafka_brokers = %config.kafka.brokers,
            kafka_group_id = %config.kafka.group_id,
            sync_mode = %config.sync_mode,
            write_mode = ?config.write_mode,
            connection_mode = ?config.connection_mode,
            "Initializing dependencies"
        );

        let writer: Arc<dyn IndexWriter> = Arc::new(
            Self::connect_to_opensearch(
                &config.writer,
                config.connection_mode,
                config.connection_retry_interval,
            )
            .await?,
        );
        info!("OpenSearch connection established");

        let namer = IndexNamer::new(&config.environment, &config.service, &config.entity);
        let plan = ProvisioningPlan::for_naming(
            &namer.naming_at(chrono::Utc::now()),
            &config.index,
            STARTUP_STEP_TIMEOUT,
        );
        provision(writer.as_ref(), &plan)
            .await
            .map_err(|e| IndexingError::config(format!("Failed to provision indices: {}", e)))?;
        info!(index = %plan.index, alias = %plan.alias, "Index resources provisioned");

        let runner = match config.sync_mode {
            SyncMode::Custom => Some(Self::build_runner(&config, writer.clone(), &namer, &metrics)?),
            SyncMode::KafkaConnect => None,
        };

        Ok(Self {
            config,
            metrics,
            writer,
            namer,
            runner,
        })
    }

    fn build_runner(
        config: &SyncConfig,
        writer: Arc<dyn IndexWriter>,
        namer: &IndexNamer,
        metrics: &Arc<SyncMetrics>,
    ) -> Result<ConsumerGroupRunner, IndexingError> {
        let source = KafkaChangeSource::new(&config.kafka).map_err(|e| {
            IndexingError::config(format!("Failed to create Kafka consumer: {}", e))
        })?;
        info!("Kafka consumer created");

        let retry = RetryEngine::new(config.retry.clone(), metrics.clone());
        let dispatcher = OperationDispatcher::new(
            writer.clone(),
            namer.clone(),
            retry.clone(),
            metrics.clone(),
            config.dispatcher.clone(),
        );

        Ok(ConsumerGroupRunner::new(
            RunnerParts {
                source: Arc::new(source),
                writer,
                dispatcher,
                namer: namer.clone(),
                retry,
                metrics: metrics.clone(),
            },
            RunnerConfig {
                write_mode: config.write_mode,
                batch_size: config.batch_size,
                flush_interval: config.flush_interval,
                partition_queue_size: config.partition_queue_size,
            },
        ))
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        config: &WriterConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchWriter, IndexingError> {
        loop {
            match Self::try_connect_opensearch(config).await {
                Ok(writer) => return Ok(writer),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(IndexingError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_hosts = ?config.hosts,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch.
    async fn try_connect_opensearch(config: &WriterConfig) -> Result<OpenSearchWriter, IndexingError> {
        let writer = OpenSearchWriter::new(config).map_err(|e| {
            IndexingError::config(format!("Failed to create OpenSearch writer: {}", e))
        })?;
        writer
            .ping(STARTUP_STEP_TIMEOUT)
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch did not answer: {}", e)))?;
        Ok(writer)
    }
}
