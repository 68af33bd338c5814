//! Configuration and dependency initialization.

mod dependencies;
mod settings;

pub use dependencies::Dependencies;
pub use settings::{
    ConnectionMode, ConnectorSettings, KafkaSettings, SyncConfig, SyncMode, WriteMode,
};
