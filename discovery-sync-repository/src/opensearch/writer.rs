//! OpenSearch writer implementation.
//!
//! Document operations go through the typed request builders of the
//! `opensearch` crate. Provisioning endpoints (composable templates and
//! lifecycle policies) are addressed through the raw request API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::{
        headers::HeaderMap,
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
        Method,
    },
    indices::IndicesExistsParts,
    params::Refresh,
    BulkParts, DeleteParts, IndexParts, OpenSearch, SearchParts, UpdateParts,
};
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::WriterConfig;
use crate::errors::IndexWriterError;
use crate::interfaces::IndexWriter;
use crate::types::{BulkRequest, BulkSummary, ClusterHealth, ClusterHealthStatus};

/// Index writer backed by an OpenSearch cluster.
///
/// # Example
///
/// ```ignore
/// use discovery_sync_repository::{IndexWriter, OpenSearchWriter, WriterConfig};
/// use serde_json::json;
/// use std::time::Duration;
///
/// let writer = OpenSearchWriter::new(&WriterConfig::default())?;
/// writer
///     .index_document(
///         "prod-digital-discovery-categories-2025-04",
///         "c1",
///         &json!({"id": "c1", "name": "Books"}),
///         Duration::from_secs(10),
///     )
///     .await?;
/// ```
pub struct OpenSearchWriter {
    client: OpenSearch,
    permits: Arc<Semaphore>,
}

impl OpenSearchWriter {
    /// Create a writer for the first configured host.
    ///
    /// # Arguments
    ///
    /// * `config` - Hosts, credentials, concurrency limit and transport timeout
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchWriter)` - A writer; no request has been made yet
    /// * `Err(IndexWriterError)` - If the host URL or transport is invalid
    pub fn new(config: &WriterConfig) -> Result<Self, IndexWriterError> {
        let host = config
            .hosts
            .first()
            .ok_or_else(|| IndexWriterError::validation("no search store host configured"))?;
        let parsed_url =
            Url::parse(host).map_err(|e| IndexWriterError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .timeout(config.request_timeout);
        if let Some((username, password)) = config.credentials() {
            builder = builder.auth(Credentials::Basic(username.to_string(), password.to_string()));
        }
        let transport = builder
            .build()
            .map_err(|e| IndexWriterError::connection(e.to_string()))?;

        if config.hosts.len() > 1 {
            warn!(
                hosts = config.hosts.len(),
                using = %host,
                "Multiple search store hosts configured, connecting to the first"
            );
        }

        info!(
            url = %host,
            max_connections = config.max_connections,
            request_timeout_secs = config.request_timeout.as_secs(),
            "Created OpenSearch writer"
        );

        Ok(Self {
            client: OpenSearch::new(transport),
            permits: Arc::new(Semaphore::new(config.max_connections.max(1))),
        })
    }

    /// Run `operation` under the concurrency limit, failing with
    /// `Timeout` if the wait for a slot plus the call exceed `timeout`.
    async fn with_deadline<T, F>(&self, timeout: Duration, operation: F) -> Result<T, IndexWriterError>
    where
        F: Future<Output = Result<T, IndexWriterError>>,
    {
        tokio::time::timeout(timeout, async {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| IndexWriterError::connection("writer is closed"))?;
            operation.await
        })
        .await
        .map_err(|_| IndexWriterError::Timeout(timeout))?
    }

    async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, IndexWriterError> {
        self.client
            .send(
                method,
                path,
                HeaderMap::new(),
                Option::<&()>::None,
                body.map(|b| JsonBody::new(b.clone())),
                None,
            )
            .await
            .map_err(|e| IndexWriterError::connection(e.to_string()))
    }

    /// Create a resource at `path` unless a GET on it already succeeds.
    async fn put_if_absent(
        &self,
        path: &str,
        body: &Value,
        operation: &str,
    ) -> Result<bool, IndexWriterError> {
        let existing = self.send_raw(Method::Get, path, None).await?;
        let status = existing.status_code().as_u16();
        if existing.status_code().is_success() {
            debug!(path = %path, "{} already exists", operation);
            return Ok(false);
        }
        if status != 404 {
            ensure_success(existing, operation).await?;
        }

        let response = self.send_raw(Method::Put, path, Some(body)).await?;
        ensure_success(response, operation).await?;
        info!(path = %path, "Created {}", operation);
        Ok(true)
    }
}

/// Pass successful responses through and classify failures by status.
async fn ensure_success(response: Response, operation: &str) -> Result<Response, IndexWriterError> {
    let status = response.status_code();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(
        operation = operation,
        status = status.as_u16(),
        body = %body,
        "Search store request failed"
    );
    Err(IndexWriterError::from_status(status.as_u16(), body))
}

fn transport_error(e: opensearch::Error) -> IndexWriterError {
    IndexWriterError::connection(e.to_string())
}

#[async_trait]
impl IndexWriter for OpenSearchWriter {
    async fn index_document(
        &self,
        index: &str,
        id: &str,
        document: &Value,
        timeout: Duration,
    ) -> Result<(), IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .index(IndexParts::IndexId(index, id))
                .body(document)
                .refresh(Refresh::True)
                .send()
                .await
                .map_err(transport_error)?;
            ensure_success(response, "index").await?;
            debug!(index = %index, id = %id, "Document indexed");
            Ok(())
        })
        .await
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: &Value,
        timeout: Duration,
    ) -> Result<(), IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .update(UpdateParts::IndexId(index, id))
                .body(json!({
                    "doc": partial,
                    "doc_as_upsert": true
                }))
                .refresh(Refresh::True)
                .send()
                .await
                .map_err(transport_error)?;
            ensure_success(response, "update").await?;
            debug!(index = %index, id = %id, "Document updated/created");
            Ok(())
        })
        .await
    }

    async fn delete_document(
        &self,
        index: &str,
        id: &str,
        timeout: Duration,
    ) -> Result<(), IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .delete(DeleteParts::IndexId(index, id))
                .refresh(Refresh::True)
                .send()
                .await
                .map_err(transport_error)?;

            // Missing documents are already in the desired state
            if response.status_code().as_u16() == 404 {
                debug!(index = %index, id = %id, "Document already absent");
                return Ok(());
            }
            ensure_success(response, "delete").await?;
            debug!(index = %index, id = %id, "Document deleted");
            Ok(())
        })
        .await
    }

    async fn bulk(
        &self,
        request: &BulkRequest,
        timeout: Duration,
    ) -> Result<BulkSummary, IndexWriterError> {
        if request.is_empty() {
            return Ok(BulkSummary::default());
        }

        self.with_deadline(timeout, async {
            let body: Vec<JsonBody<Value>> =
                request.lines().into_iter().map(JsonBody::new).collect();

            let response = self
                .client
                .bulk(BulkParts::None)
                .body(body)
                .refresh(Refresh::True)
                .send()
                .await
                .map_err(transport_error)?;
            let response = ensure_success(response, "bulk").await?;

            let parsed: Value = response
                .json()
                .await
                .map_err(|e| IndexWriterError::parse(e.to_string()))?;
            let summary = BulkSummary::from_response(request.len(), &parsed)?;

            debug!(
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed(),
                "Bulk request completed"
            );
            Ok(summary)
        })
        .await
    }

    async fn search(
        &self,
        index: &str,
        query: &Value,
        timeout: Duration,
    ) -> Result<Vec<Value>, IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .search(SearchParts::Index(&[index]))
                .body(query)
                .send()
                .await
                .map_err(transport_error)?;
            let response = ensure_success(response, "search").await?;

            let parsed: Value = response
                .json()
                .await
                .map_err(|e| IndexWriterError::parse(e.to_string()))?;
            let hits = parsed["hits"]["hits"]
                .as_array()
                .ok_or_else(|| IndexWriterError::parse("search response has no hits"))?;

            Ok(hits
                .iter()
                .filter_map(|hit| hit.get("_source").cloned())
                .collect())
        })
        .await
    }

    async fn ping(&self, timeout: Duration) -> Result<(), IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self.client.ping().send().await.map_err(transport_error)?;
            ensure_success(response, "ping").await?;
            Ok(())
        })
        .await
    }

    async fn check_health(&self, timeout: Duration) -> Result<ClusterHealth, IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .cluster()
                .health(ClusterHealthParts::None)
                .send()
                .await
                .map_err(transport_error)?;
            let response = ensure_success(response, "cluster health").await?;

            let health: ClusterHealth = response
                .json()
                .await
                .map_err(|e| IndexWriterError::parse(e.to_string()))?;

            if health.status == ClusterHealthStatus::Red {
                return Err(IndexWriterError::Unavailable {
                    status: 503,
                    message: format!("cluster {} health is red", health.cluster_name),
                });
            }
            Ok(health)
        })
        .await
    }

    async fn index_exists(&self, index: &str, timeout: Duration) -> Result<bool, IndexWriterError> {
        self.with_deadline(timeout, async {
            let response = self
                .client
                .indices()
                .exists(IndicesExistsParts::Index(&[index]))
                .send()
                .await
                .map_err(transport_error)?;

            match response.status_code().as_u16() {
                200 => Ok(true),
                404 => Ok(false),
                _ => ensure_success(response, "index exists").await.map(|_| false),
            }
        })
        .await
    }

    async fn ensure_index_template(
        &self,
        name: &str,
        template: &Value,
        timeout: Duration,
    ) -> Result<bool, IndexWriterError> {
        let path = format!("/_index_template/{}", name);
        self.with_deadline(timeout, self.put_if_absent(&path, template, "index template"))
            .await
    }

    async fn ensure_lifecycle_policy(
        &self,
        name: &str,
        policy: &Value,
        timeout: Duration,
    ) -> Result<bool, IndexWriterError> {
        let path = format!("/_plugins/_ism/policies/{}", name);
        self.with_deadline(timeout, self.put_if_absent(&path, policy, "lifecycle policy"))
            .await
    }

    async fn ensure_index(&self, index: &str, timeout: Duration) -> Result<bool, IndexWriterError> {
        self.with_deadline(timeout, async {
            let path = format!("/{}", index);
            let response = self.send_raw(Method::Put, &path, None).await?;

            let status = response.status_code();
            if status.is_success() {
                info!(index = %index, "Created index");
                return Ok(true);
            }

            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 400 && body.contains("resource_already_exists_exception") {
                debug!(index = %index, "Index already exists");
                return Ok(false);
            }
            Err(IndexWriterError::from_status(status.as_u16(), body))
        })
        .await
    }

    async fn ensure_alias(
        &self,
        index: &str,
        alias: &str,
        timeout: Duration,
    ) -> Result<(), IndexWriterError> {
        self.with_deadline(timeout, async {
            let body = json!({
                "actions": [
                    { "add": { "index": index, "alias": alias } }
                ]
            });
            let response = self.send_raw(Method::Post, "/_aliases", Some(&body)).await?;
            ensure_success(response, "alias").await?;
            debug!(index = %index, alias = %alias, "Alias ensured");
            Ok(())
        })
        .await
    }
}
