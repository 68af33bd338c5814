//! Wire format of change-data-capture events.

use serde::Deserialize;
use serde_json::Value;

/// Outer wrapper of a change event as produced by the JSON converter.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEnvelope {
    pub payload: ChangePayload,
}

/// Row images and metadata of one change.
///
/// The row images stay untyped here so that a malformed image is reported
/// as a transform failure rather than as an unreadable envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePayload {
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
    #[serde(default)]
    pub source: Option<SourceInfo>,
    pub op: String,
    /// When the connector processed the change.
    #[serde(default)]
    pub ts_ms: Option<i64>,
}

/// Origin of a change in the source database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub connector: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// When the change was committed in the source database.
    #[serde(default)]
    pub ts_ms: Option<i64>,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, rename = "txId")]
    pub tx_id: Option<i64>,
    #[serde(default)]
    pub lsn: Option<i64>,
}
