//! Interface definitions for the index writer.
//!
//! The `IndexWriter` trait lets the engine run against OpenSearch in
//! production and against in-memory mocks in tests.

mod index_writer;

pub use index_writer::IndexWriter;
