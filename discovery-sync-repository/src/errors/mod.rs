//! Error types for the index writer.

mod index_writer_error;

pub use index_writer_error::IndexWriterError;
