//! # Discovery Sync Repository
//!
//! The index writer seam of the sync engine: the `IndexWriter` trait, its
//! error type, the OpenSearch implementation, the bulk request encoding and
//! the idempotent startup provisioning of templates, lifecycle policies,
//! indices and aliases.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod opensearch;
pub mod provisioning;
pub mod types;

pub use config::{IndexSettings, LifecycleThresholds, WriterConfig};
pub use errors::IndexWriterError;
pub use interfaces::IndexWriter;
pub use opensearch::OpenSearchWriter;
pub use provisioning::{provision, ProvisioningPlan};
pub use types::{
    BulkItem, BulkItemFailure, BulkRequest, BulkSummary, ClusterHealth, ClusterHealthStatus,
};
