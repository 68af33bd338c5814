//! Kafka Connect monitoring.
//!
//! In connector mode a Kafka Connect sink moves change events into the
//! store and this engine only watches it, publishing the connector state to
//! the shared health view.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::config::ConnectorSettings;
use crate::health::{ConnectorState, HealthState};

/// Errors polling the Kafka Connect REST API.
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("connector {connector} not found")]
    NotFound { connector: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorStatus {
    pub name: String,
    pub connector: WorkerState,
    #[serde(default)]
    pub tasks: Vec<TaskState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerState {
    pub state: String,
    #[serde(default)]
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskState {
    pub id: u32,
    pub state: String,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default)]
    pub trace: Option<String>,
}

impl ConnectorStatus {
    fn to_state(&self) -> ConnectorState {
        ConnectorState {
            connector: self.name.clone(),
            state: self.connector.state.clone(),
            running_tasks: self.tasks.iter().filter(|t| t.state == "RUNNING").count(),
            total_tasks: self.tasks.len(),
            checked_at: Utc::now(),
        }
    }
}

/// Polls one connector's status.
pub struct ConnectorMonitor {
    client: ReqwestClient,
    status_url: String,
    connector: String,
    poll_interval: Duration,
    health: Arc<HealthState>,
}

impl ConnectorMonitor {
    pub fn new(settings: &ConnectorSettings, health: Arc<HealthState>) -> Self {
        Self {
            client: ReqwestClient::new(),
            status_url: format!("{}/connectors/{}/status", settings.url, settings.connector),
            connector: settings.connector.clone(),
            poll_interval: settings.poll_interval,
            health,
        }
    }

    /// Fetch the connector status once and publish it.
    pub async fn poll_once(&self) -> Result<ConnectorState, ConnectorError> {
        let response = self.client.get(&self.status_url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ConnectorError::NotFound {
                connector: self.connector.clone(),
            });
        }
        let status: ConnectorStatus = response.error_for_status()?.json().await?;

        for task in status.tasks.iter().filter(|t| t.state == "FAILED") {
            error!(
                connector = %status.name,
                task_id = task.id,
                worker_id = task.worker_id.as_deref().unwrap_or("unknown"),
                trace = task.trace.as_deref().unwrap_or(""),
                "Connector task failed"
            );
        }

        let state = status.to_state();
        self.health.set_connector_state(Some(state.clone()));
        Ok(state)
    }

    /// Poll every interval until cancelled.
    #[instrument(skip(self, cancel), fields(connector = %self.connector))]
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(status_url = %self.status_url, "Connector monitor started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Connector monitor stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once().await {
                Ok(state) if state.is_running() => info!(
                    state = %state.state,
                    running_tasks = state.running_tasks,
                    total_tasks = state.total_tasks,
                    "Connector status"
                ),
                Ok(state) => warn!(
                    state = %state.state,
                    running_tasks = state.running_tasks,
                    total_tasks = state.total_tasks,
                    "Connector is not running"
                ),
                Err(e) => {
                    warn!(error = %e, "Failed to poll connector status");
                    self.health.set_connector_state(None);
                }
            }
        }
    }
}
