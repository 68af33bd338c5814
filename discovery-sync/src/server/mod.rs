//! Operator HTTP surface: liveness, readiness, metrics, sync mode and
//! category reads through the index alias.

pub mod handlers;
pub mod state;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use self::state::AppState;

/// Create the router with all operator routes.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        .route("/metrics", get(handlers::metrics))
        .route("/sync/mode", get(handlers::get_mode).post(handlers::set_mode))
        .route("/api/v1/categories", get(handlers::list_categories))
        .route("/api/v1/category", get(handlers::get_category))
        .with_state(state)
}

/// Serve `app` on `addr` until `cancel` fires.
pub async fn run_server(
    app: Router,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Ops server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}
