//! Change event consumption.
//!
//! The runner reads messages through the [`ChangeSource`] trait so the
//! Kafka client can be swapped for an in-memory source in tests.

mod kafka_source;
mod messages;
mod source;

pub use kafka_source::KafkaChangeSource;
pub use messages::ChangeMessage;
pub use source::ChangeSource;
