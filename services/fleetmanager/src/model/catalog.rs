//! Shard-metadata model definitions.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Stable identifier for a catalog entry: one release channel of one
/// connector type.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub connector_type_id: String,
    pub channel: String,
}

/// Versioned opaque configuration tied to a `(connector_type, channel)` pair.
///
/// `revision` is derived deterministically from the configured metadata
/// payload; a bumped revision signals that connectors on the channel need
/// redeployment. The payload itself is stored as canonical JSON (the default
/// `serde_json` map keeps keys sorted).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShardMetadata {
    pub id: i64,
    pub connector_type_id: String,
    pub channel: String,
    pub revision: i64,
    pub shard_metadata: serde_json::Value,
}

impl ShardMetadata {
    pub fn key(&self) -> CatalogKey {
        CatalogKey {
            connector_type_id: self.connector_type_id.clone(),
            channel: self.channel.clone(),
        }
    }
}
