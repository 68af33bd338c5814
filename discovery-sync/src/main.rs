//! Discovery Sync Main Entry Point
//!
//! Consumes category change events from Kafka and applies them to
//! OpenSearch, or monitors a Kafka Connect sink doing the same.

use std::net::SocketAddr;
use std::sync::Arc;

use discovery_sync::config::SyncMode;
use discovery_sync::connect::ConnectorMonitor;
use discovery_sync::health::{run_health_probe, HealthState};
use discovery_sync::metrics::{run_reporter, SyncMetrics};
use discovery_sync::server::{create_app, run_server, AppState};
use discovery_sync::{Dependencies, IndexingError, SyncConfig};
use dotenv::dotenv;
use std::env;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging.
fn init_tracing() -> Result<(), IndexingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("discovery_sync=info,discovery_sync_repository=info")
    });

    let json_logs = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;

        info!(
            service_name = "discovery-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with JSON format"
        );
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init()
            .map_err(|e| IndexingError::config(e.to_string()))?;

        info!(
            service_name = "discovery-sync",
            service_version = env!("CARGO_PKG_VERSION"),
            "Tracing initialized with console output"
        );
    }

    Ok(())
}

/// Cancel `cancel` on ctrl-c.
fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, stopping");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), IndexingError> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing()?;

    info!("Starting digital discovery sync");

    let config = SyncConfig::from_env().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;
    let metrics = Arc::new(SyncMetrics::new(&config.entity));

    let deps = match Dependencies::new(config, metrics.clone()).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };
    let Dependencies {
        config,
        metrics,
        writer,
        namer,
        runner,
    } = deps;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let health = Arc::new(match &runner {
        Some(runner) => HealthState::for_runner(runner.status_receiver()),
        None => HealthState::for_connector(),
    });

    let reporter = tokio::spawn(run_reporter(
        metrics.clone(),
        config.metrics_report_interval,
        cancel.clone(),
    ));
    let probe = tokio::spawn(run_health_probe(
        writer.clone(),
        health.clone(),
        namer.alias(),
        config.health_probe_interval,
        config.dispatcher.operation_timeout,
        cancel.clone(),
    ));

    let app = create_app(
        AppState::new(
            health.clone(),
            metrics.clone(),
            writer.clone(),
            namer,
            config.sync_mode,
            config.connector.is_some(),
        )
        .with_read_timeout(config.dispatcher.operation_timeout),
    );
    let addr = SocketAddr::from(([0, 0, 0, 0], config.ops_port));
    let server = tokio::spawn(run_server(app, addr, cancel.clone()));

    let result = match (config.sync_mode, runner, config.connector.as_ref()) {
        (SyncMode::Custom, Some(runner), _) => runner.run(cancel.clone()).await.map_err(IndexingError::from),
        (SyncMode::KafkaConnect, _, Some(settings)) => {
            ConnectorMonitor::new(settings, health.clone())
                .run(cancel.clone())
                .await;
            Ok(())
        }
        (mode, _, _) => Err(IndexingError::config(format!(
            "sync mode '{}' is not fully configured",
            mode
        ))),
    };

    // Stop the background tasks whatever ended the main loop.
    cancel.cancel();
    let _ = reporter.await;
    let _ = probe.await;
    match server.await {
        Ok(Err(e)) => error!(error = %e, "Ops server failed"),
        Err(e) => error!(error = %e, "Ops server task panicked"),
        Ok(Ok(())) => {}
    }

    metrics.cleanup();

    match result {
        Ok(()) => {
            info!("Discovery sync stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Discovery sync failed");
            Err(e)
        }
    }
}
