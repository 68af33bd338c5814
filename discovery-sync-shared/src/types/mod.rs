//! Core data types for the sync engine.

pub mod category;
pub mod index_naming;
pub mod operation;
pub mod sync_record;

pub use category::Category;
pub use index_naming::IndexNaming;
pub use operation::{CategoryOperation, OperationKind};
pub use sync_record::{SyncRecord, SyncStatus};
