//! Shared state of the operator endpoints.

use std::sync::Arc;
use std::time::Duration;

use discovery_sync_repository::IndexWriter;
use tokio::sync::RwLock;

use crate::config::SyncMode;
use crate::health::HealthState;
use crate::metrics::SyncMetrics;
use crate::naming::IndexNamer;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthState>,
    pub metrics: Arc<SyncMetrics>,
    /// Serves category reads through the alias.
    pub writer: Arc<dyn IndexWriter>,
    pub read_timeout: Duration,
    pub namer: IndexNamer,
    /// Mode this process runs in.
    pub mode: SyncMode,
    /// Whether a connector is configured, which enables `kafka-connect`.
    pub connector_configured: bool,
    /// Mode requested for the next start.
    pub requested_mode: Arc<RwLock<Option<SyncMode>>>,
}

impl AppState {
    pub fn new(
        health: Arc<HealthState>,
        metrics: Arc<SyncMetrics>,
        writer: Arc<dyn IndexWriter>,
        namer: IndexNamer,
        mode: SyncMode,
        connector_configured: bool,
    ) -> Self {
        Self {
            health,
            metrics,
            writer,
            read_timeout: Duration::from_secs(5),
            namer,
            mode,
            connector_configured,
            requested_mode: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn is_enabled(&self, mode: SyncMode) -> bool {
        match mode {
            SyncMode::Custom => true,
            SyncMode::KafkaConnect => self.connector_configured,
        }
    }
}
