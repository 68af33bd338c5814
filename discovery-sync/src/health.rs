//! Last-known health of the components the engine depends on.
//!
//! Readiness answers from these values instead of calling the store on
//! every request. A probe task refreshes the store's health in the
//! background.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use discovery_sync_repository::{ClusterHealthStatus, IndexWriter};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::runner::RunnerStatus;

/// Up or down, as reported on the operator endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentHealth {
    Up,
    Down,
}

impl ComponentHealth {
    fn from_up(up: bool) -> Self {
        if up {
            Self::Up
        } else {
            Self::Down
        }
    }

    pub fn is_up(&self) -> bool {
        *self == Self::Up
    }
}

/// State of a Kafka Connect connector as last polled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorState {
    pub connector: String,
    pub state: String,
    pub running_tasks: usize,
    pub total_tasks: usize,
    pub checked_at: DateTime<Utc>,
}

impl ConnectorState {
    pub fn is_running(&self) -> bool {
        self.state == "RUNNING"
    }
}

/// Shared health view.
pub struct HealthState {
    store_up: AtomicBool,
    runner: Option<watch::Receiver<RunnerStatus>>,
    connector: watch::Sender<Option<ConnectorState>>,
}

impl HealthState {
    /// Health for custom mode, following the runner's status.
    pub fn for_runner(runner: watch::Receiver<RunnerStatus>) -> Self {
        Self {
            store_up: AtomicBool::new(true),
            runner: Some(runner),
            connector: watch::channel(None).0,
        }
    }

    /// Health for connector mode, following the polled connector state.
    pub fn for_connector() -> Self {
        Self {
            store_up: AtomicBool::new(true),
            runner: None,
            connector: watch::channel(None).0,
        }
    }

    pub fn store(&self) -> ComponentHealth {
        ComponentHealth::from_up(self.store_up.load(Ordering::Relaxed))
    }

    pub fn set_store_up(&self, up: bool) {
        let was_up = self.store_up.swap(up, Ordering::Relaxed);
        if was_up != up {
            info!(store_up = up, "Search store health changed");
        }
    }

    /// Consumer side health: the runner is running, or the connector is.
    pub fn kafka(&self) -> ComponentHealth {
        let up = match &self.runner {
            Some(runner) => *runner.borrow() == RunnerStatus::Running,
            None => self
                .connector
                .borrow()
                .as_ref()
                .map_or(false, ConnectorState::is_running),
        };
        ComponentHealth::from_up(up)
    }

    pub fn consumer_status(&self) -> Option<RunnerStatus> {
        self.runner.as_ref().map(|runner| *runner.borrow())
    }

    pub fn connector_state(&self) -> Option<ConnectorState> {
        self.connector.borrow().clone()
    }

    pub fn set_connector_state(&self, state: Option<ConnectorState>) {
        self.connector.send_replace(state);
    }
}

/// Refresh the store's health every `period` until cancelled.
///
/// The store counts as up when the cluster is not red and `alias` resolves
/// to an index. Both checks are reads.
pub async fn run_health_probe(
    writer: Arc<dyn IndexWriter>,
    health: Arc<HealthState>,
    alias: String,
    period: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Health probe stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        health.set_store_up(probe_store(writer.as_ref(), &alias, timeout).await);
    }
}

async fn probe_store(writer: &dyn IndexWriter, alias: &str, timeout: Duration) -> bool {
    let cluster = match writer.check_health(timeout).await {
        Ok(cluster) => cluster,
        Err(e) => {
            warn!(error = %e, "Store health probe failed");
            return false;
        }
    };
    debug!(cluster = %cluster.cluster_name, status = ?cluster.status, "Store health probed");
    if cluster.status == ClusterHealthStatus::Red {
        return false;
    }

    match writer.index_exists(alias, timeout).await {
        Ok(true) => true,
        Ok(false) => {
            warn!(alias = %alias, "Write alias does not resolve to an index");
            false
        }
        Err(e) => {
            warn!(alias = %alias, error = %e, "Alias check failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use discovery_sync_repository::{BulkRequest, BulkSummary, ClusterHealth, IndexWriterError};
    use serde_json::Value;

    #[test]
    fn test_kafka_health_follows_runner() {
        let (tx, rx) = watch::channel(RunnerStatus::Starting);
        let health = HealthState::for_runner(rx);
        assert_eq!(health.kafka(), ComponentHealth::Down);

        tx.send_replace(RunnerStatus::Running);
        assert_eq!(health.kafka(), ComponentHealth::Up);
        assert_eq!(health.consumer_status(), Some(RunnerStatus::Running));

        tx.send_replace(RunnerStatus::Error);
        assert_eq!(health.kafka(), ComponentHealth::Down);
    }

    #[test]
    fn test_kafka_health_follows_connector() {
        let health = HealthState::for_connector();
        assert_eq!(health.kafka(), ComponentHealth::Down);

        health.set_connector_state(Some(ConnectorState {
            connector: "categories-sink".to_string(),
            state: "RUNNING".to_string(),
            running_tasks: 1,
            total_tasks: 1,
            checked_at: Utc::now(),
        }));
        assert_eq!(health.kafka(), ComponentHealth::Up);
        assert!(health.consumer_status().is_none());
    }

    #[test]
    fn test_store_health_toggles() {
        let health = HealthState::for_connector();
        assert!(health.store().is_up());
        health.set_store_up(false);
        assert_eq!(health.store(), ComponentHealth::Down);
    }

    struct ProbedStore {
        status: Option<ClusterHealthStatus>,
        alias_exists: bool,
    }

    #[async_trait]
    impl IndexWriter for ProbedStore {
        async fn index_document(&self, _: &str, _: &str, _: &Value, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }

        async fn update_document(&self, _: &str, _: &str, _: &Value, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }

        async fn delete_document(&self, _: &str, _: &str, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }

        async fn bulk(&self, request: &BulkRequest, _: Duration) -> Result<BulkSummary, IndexWriterError> {
            Ok(BulkSummary::all_succeeded(request.len()))
        }

        async fn search(&self, _: &str, _: &Value, _: Duration) -> Result<Vec<Value>, IndexWriterError> {
            Ok(vec![])
        }

        async fn ping(&self, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }

        async fn check_health(&self, _: Duration) -> Result<ClusterHealth, IndexWriterError> {
            match self.status {
                Some(status) => Ok(ClusterHealth {
                    cluster_name: "search".to_string(),
                    status,
                    number_of_nodes: 1,
                }),
                None => Err(IndexWriterError::connection("connection refused")),
            }
        }

        async fn index_exists(&self, _: &str, _: Duration) -> Result<bool, IndexWriterError> {
            Ok(self.alias_exists)
        }

        async fn ensure_index_template(&self, _: &str, _: &Value, _: Duration) -> Result<bool, IndexWriterError> {
            Ok(false)
        }

        async fn ensure_lifecycle_policy(&self, _: &str, _: &Value, _: Duration) -> Result<bool, IndexWriterError> {
            Ok(false)
        }

        async fn ensure_index(&self, _: &str, _: Duration) -> Result<bool, IndexWriterError> {
            Ok(false)
        }

        async fn ensure_alias(&self, _: &str, _: &str, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }
    }

    async fn probe(status: Option<ClusterHealthStatus>, alias_exists: bool) -> bool {
        let store = ProbedStore {
            status,
            alias_exists,
        };
        probe_store(&store, "test-digital-discovery-categories", Duration::from_secs(1)).await
    }

    #[tokio::test]
    async fn test_probe_requires_healthy_cluster_and_alias() {
        assert!(probe(Some(ClusterHealthStatus::Green), true).await);
        assert!(probe(Some(ClusterHealthStatus::Yellow), true).await);
        assert!(!probe(Some(ClusterHealthStatus::Red), true).await);
        assert!(!probe(Some(ClusterHealthStatus::Green), false).await);
        assert!(!probe(None, true).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_marks_store_down_until_cancelled() {
        let health = Arc::new(HealthState::for_connector());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_health_probe(
            Arc::new(ProbedStore {
                status: None,
                alias_exists: true,
            }),
            health.clone(),
            "test-digital-discovery-categories".to_string(),
            Duration::from_secs(10),
            Duration::from_secs(1),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(health.store(), ComponentHealth::Down);

        cancel.cancel();
        task.await.unwrap();
    }
}
