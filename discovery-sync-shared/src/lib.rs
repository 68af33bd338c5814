//! # Discovery Sync Shared
//!
//! Data structures shared by the sync engine and the index writer: the
//! category entity as stored in the search index, the normalized change
//! operation, the per-operation sync record and the index naming scheme.

pub mod types;

pub use types::category::Category;
pub use types::index_naming::IndexNaming;
pub use types::operation::{CategoryOperation, OperationKind};
pub use types::sync_record::{SyncRecord, SyncStatus};
