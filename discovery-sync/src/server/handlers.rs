//! HTTP request handlers.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use discovery_sync_repository::IndexWriterError;
use discovery_sync_shared::Category;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::config::SyncMode;
use crate::server::state::AppState;

const DEFAULT_LIST_SIZE: usize = 100;
const MAX_LIST_SIZE: usize = 1_000;

/// Body of a mode change request.
#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

/// Query of a category listing.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub size: Option<usize>,
}

/// Query of a single category lookup.
#[derive(Debug, Deserialize)]
pub struct CategoryParams {
    pub id: Option<String>,
}

/// Liveness: the process is up.
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "UP",
        "timestamp": Utc::now(),
    }))
}

/// Readiness from the last-known component health. 503 when any is down.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.health.store();
    let kafka = state.health.kafka();
    let ready = store.is_up() && kafka.is_up();

    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        code,
        Json(json!({
            "status": if ready { "UP" } else { "DOWN" },
            "timestamp": Utc::now(),
            "elasticsearch": store,
            "kafka": kafka,
        })),
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

pub async fn get_mode(State(state): State<AppState>) -> impl IntoResponse {
    let requested = *state.requested_mode.read().await;
    Json(json!({
        "mode": state.mode,
        "enabled": state.health.kafka().is_up(),
        "current_index": state.namer.current_index(),
        "alias": state.namer.alias(),
        "consumer_status": state.health.consumer_status().map(|s| s.as_str()),
        "connector": state.health.connector_state(),
        "requested_mode": requested,
    }))
}

/// Record the mode to use at the next start.
///
/// Modes are exclusive and chosen at startup, so a request never switches
/// the running process.
pub async fn set_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeRequest>,
) -> impl IntoResponse {
    let mode: SyncMode = match request.mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            warn!(mode = %request.mode, "Rejected sync mode change");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "status": "error", "message": e })),
            );
        }
    };

    if !state.is_enabled(mode) {
        warn!(mode = %mode, "Rejected sync mode change to disabled mode");
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "error",
                "message": format!("sync mode '{}' is not enabled", mode),
            })),
        );
    }

    *state.requested_mode.write().await = Some(mode);
    info!(requested_mode = %mode, active_mode = %state.mode, "Sync mode change requested");

    (
        StatusCode::ACCEPTED,
        Json(json!({
            "status": "accepted",
            "mode": mode,
            "active_mode": state.mode,
            "message": "mode is applied at next start",
        })),
    )
}

/// List indexed categories through the alias, ordered by id.
///
/// At most `size` categories are returned (default 100, capped at 1000).
pub async fn list_categories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Response {
    let size = params.size.unwrap_or(DEFAULT_LIST_SIZE).min(MAX_LIST_SIZE);
    let query = json!({
        "query": { "match_all": {} },
        "size": size,
        "sort": [{ "id": "asc" }],
    });

    match search_categories(&state, &query).await {
        Ok(categories) => Json(categories).into_response(),
        Err(response) => response,
    }
}

/// Look up one indexed category by id.
pub async fn get_category(
    State(state): State<AppState>,
    Query(params): Query<CategoryParams>,
) -> Response {
    let Some(id) = params.id.filter(|id| !id.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "category id is required");
    };
    let query = json!({
        "query": { "term": { "id": id } },
        "size": 1,
    });

    match search_categories(&state, &query).await {
        Ok(categories) => match categories.into_iter().next() {
            Some(category) => Json(category).into_response(),
            None => error_response(
                StatusCode::NOT_FOUND,
                &format!("category {} not found", id),
            ),
        },
        Err(response) => response,
    }
}

async fn search_categories(state: &AppState, query: &Value) -> Result<Vec<Category>, Response> {
    let alias = state.namer.alias();
    let documents = state
        .writer
        .search(&alias, query, state.read_timeout)
        .await
        .map_err(|e| {
            error!(alias = %alias, error = %e, "Category search failed");
            let code = if e.is_retryable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            error_response(code, &e.to_string())
        })?;

    documents
        .into_iter()
        .map(serde_json::from_value::<Category>)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            let err = IndexWriterError::parse(e.to_string());
            error!(alias = %alias, error = %err, "Indexed document is not a category");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
        })
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (
        code,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthState;
    use crate::metrics::SyncMetrics;
    use crate::naming::IndexNamer;
    use crate::runner::RunnerStatus;
    use crate::server::create_app;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use discovery_sync_repository::{BulkRequest, BulkSummary, ClusterHealth, IndexWriter};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::watch;
    use tower::ServiceExt;

    const ALIAS: &str = "test-digital-discovery-categories";

    /// Store answering `match_all` and `term` queries on `id` for one alias.
    #[derive(Default)]
    struct AliasStore {
        documents: Vec<Value>,
        unavailable: bool,
        searches: Mutex<Vec<(String, Value)>>,
    }

    impl AliasStore {
        fn with(documents: Vec<Value>) -> Self {
            Self {
                documents,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl IndexWriter for AliasStore {
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

        async fn search(&self, index: &str, query: &Value, _: Duration) -> Result<Vec<Value>, IndexWriterError> {
            self.searches
                .lock()
                .unwrap()
                .push((index.to_string(), query.clone()));
            if self.unavailable {
                return Err(IndexWriterError::connection("connection refused"));
            }
            if index != ALIAS {
                return Ok(vec![]);
            }
            let size = query["size"].as_u64().unwrap_or(10) as usize;
            let wanted = query["query"]["term"]["id"].as_str();
            Ok(self
                .documents
                .iter()
                .filter(|doc| wanted.map_or(true, |id| doc["id"] == id))
                .take(size)
                .cloned()
                .collect())
        }

        async fn ping(&self, _: Duration) -> Result<(), IndexWriterError> {
            Ok(())
        }

        async fn check_health(&self, _: Duration) -> Result<ClusterHealth, IndexWriterError> {
            Err(IndexWriterError::connection("not used"))
        }

        async fn index_exists(&self, _: &str, _: Duration) -> Result<bool, IndexWriterError> {
            Ok(true)
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

    fn state_with_store(status: RunnerStatus, store: Arc<AliasStore>) -> (AppState, watch::Sender<RunnerStatus>) {
        let (tx, rx) = watch::channel(status);
        let state = AppState::new(
            Arc::new(HealthState::for_runner(rx)),
            Arc::new(SyncMetrics::new("categories")),
            store,
            IndexNamer::new("test", "digital-discovery", "categories"),
            SyncMode::Custom,
            false,
        );
        (state, tx)
    }

    fn app_state(status: RunnerStatus) -> (AppState, watch::Sender<RunnerStatus>) {
        state_with_store(status, Arc::new(AliasStore::default()))
    }

    fn indexed(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "status": 1,
            "version": 2,
            "sync_status": "SUCCESS",
            "last_sync": "2025-04-01T00:00:05Z"
        })
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = create_app(state).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_mode(mode: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/sync/mode")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "mode": mode }).to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_is_always_up() {
        let (state, _tx) = app_state(RunnerStatus::Error);
        let (status, body) = send(state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "UP");
    }

    #[tokio::test]
    async fn test_ready_reflects_components() {
        let (state, tx) = app_state(RunnerStatus::Running);
        let (status, body) = send(state.clone(), get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["elasticsearch"], "UP");
        assert_eq!(body["kafka"], "UP");

        tx.send_replace(RunnerStatus::Error);
        let (status, body) = send(state.clone(), get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "DOWN");
        assert_eq!(body["kafka"], "DOWN");

        tx.send_replace(RunnerStatus::Running);
        state.health.set_store_up(false);
        let (status, body) = send(state, get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["elasticsearch"], "DOWN");
    }

    #[tokio::test]
    async fn test_metrics_snapshot() {
        let (state, _tx) = app_state(RunnerStatus::Running);
        state.metrics.record_message_consumed();
        let (status, body) = send(state, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"]["consumed"], 1);
    }

    #[tokio::test]
    async fn test_get_mode() {
        let (state, _tx) = app_state(RunnerStatus::Running);
        let (status, body) = send(state, get("/sync/mode")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mode"], "custom");
        assert_eq!(body["enabled"], true);
        assert_eq!(body["alias"], "test-digital-discovery-categories");
        assert_eq!(body["consumer_status"], "RUNNING");
        assert!(body["current_index"]
            .as_str()
            .unwrap()
            .starts_with("test-digital-discovery-categories-"));
    }

    #[tokio::test]
    async fn test_set_mode() {
        let (state, _tx) = app_state(RunnerStatus::Running);

        let (status, _) = send(state.clone(), post_mode("streaming")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(state.clone(), post_mode("kafka-connect")).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(state.clone(), post_mode("custom")).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["mode"], "custom");
        assert_eq!(*state.requested_mode.read().await, Some(SyncMode::Custom));
    }

    #[tokio::test]
    async fn test_list_categories_reads_through_alias() {
        let store = Arc::new(AliasStore::with(vec![
            indexed("c1", "Books"),
            indexed("c2", "Games"),
        ]));
        let (state, _tx) = state_with_store(RunnerStatus::Running, store.clone());

        let (status, body) = send(state, get("/api/v1/categories?size=5")).await;

        assert_eq!(status, StatusCode::OK);
        let categories = body.as_array().unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0]["id"], "c1");
        assert_eq!(categories[1]["name"], "Games");
        assert_eq!(categories[1]["sync_status"], "SUCCESS");

        let searches = store.searches.lock().unwrap();
        assert_eq!(searches[0].0, ALIAS);
        assert_eq!(searches[0].1["size"], 5);
        assert!(searches[0].1["query"]["match_all"].is_object());
    }

    #[tokio::test]
    async fn test_list_size_is_capped() {
        let store = Arc::new(AliasStore::default());
        let (state, _tx) = state_with_store(RunnerStatus::Running, store.clone());

        let (status, body) = send(state, get("/api/v1/categories?size=50000")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
        assert_eq!(store.searches.lock().unwrap()[0].1["size"], 1_000);
    }

    #[tokio::test]
    async fn test_get_category_by_id() {
        let store = Arc::new(AliasStore::with(vec![
            indexed("c1", "Books"),
            indexed("c2", "Games"),
        ]));
        let (state, _tx) = state_with_store(RunnerStatus::Running, store);

        let (status, body) = send(state.clone(), get("/api/v1/category?id=c2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "c2");
        assert_eq!(body["name"], "Games");

        let (status, body) = send(state.clone(), get("/api/v1/category?id=c9")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");

        let (status, _) = send(state, get("/api/v1/category")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_category_reads_report_store_outage() {
        let store = Arc::new(AliasStore {
            unavailable: true,
            ..Default::default()
        });
        let (state, _tx) = state_with_store(RunnerStatus::Running, store);

        let (status, body) = send(state.clone(), get("/api/v1/categories")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "error");

        let (status, _) = send(state, get("/api/v1/category?id=c1")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_malformed_indexed_document_is_an_error() {
        let store = Arc::new(AliasStore::with(vec![json!({ "id": 42 })]));
        let (state, _tx) = state_with_store(RunnerStatus::Running, store);

        let (status, _) = send(state, get("/api/v1/categories")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
