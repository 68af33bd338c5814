//! OpenSearch implementation of the index writer.

mod index_config;
mod writer;

pub use index_config::{category_template, lifecycle_policy, CATEGORY_MAPPINGS_VERSION};
pub use writer::OpenSearchWriter;
