//! Connector model definitions.
//!
//! # Purpose
//! Defines the connector record, its status row, and the two lifecycle enums
//! (user intent and reconciled phase) used by the store, API, and reconciler.
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// What the user wants to happen to a connector.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DesiredState {
    Ready,
    Unassigned,
    Deleted,
}

/// Where the reconciler has actually taken the connector.
///
/// `Assigning` is the initial phase for accepted requests. Hard deletion
/// removes the row entirely, so there is no phase for it.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorPhase {
    Assigning,
    Assigned,
    Deleting,
    Deleted,
}

/// Reconciler-owned status row, keyed by the connector id.
///
/// Kept separate from `Connector` so phase transitions can be saved without
/// rewriting the user-owned definition.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ConnectorStatus {
    pub id: String,
    pub namespace_id: Option<String>,
    pub phase: ConnectorPhase,
}

/// A user-declared workload record pending or realized on a remote cluster.
///
/// `namespace_id` on the connector row is the user's *preferred* namespace;
/// the namespace the workload actually landed on lives in `status`.
/// `version` increases strictly on every user edit and drives redeployment.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct Connector {
    pub id: String,
    pub owner: String,
    pub organisation_id: String,
    pub connector_type_id: String,
    pub channel: String,
    pub desired_state: DesiredState,
    pub namespace_id: Option<String>,
    pub version: i64,
    pub definition: serde_json::Value,
    pub status: ConnectorStatus,
}
