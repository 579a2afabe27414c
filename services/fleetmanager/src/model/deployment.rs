//! Deployment model definitions.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// The concrete realization of a connector on a specific cluster/namespace.
///
/// At most one deployment exists per connector (`connector_id` is unique in
/// the store). `status` is opaque here; it is written by the cluster-side
/// agent and only carried through.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Deployment {
    pub id: String,
    pub connector_id: String,
    pub cluster_id: String,
    pub namespace_id: String,
    pub connector_version: i64,
    pub connector_shard_metadata_id: i64,
    pub status: String,
}
