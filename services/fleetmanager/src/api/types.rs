//! HTTP API request/response types.
//!
//! # Purpose
//! Defines shared payload shapes for the fleet-manager REST API and OpenAPI
//! schema generation.
use crate::model::{Connector, DesiredState};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct HealthStatus {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ReadyStatus {
    pub ready: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct SystemInfo {
    pub api_version: String,
    pub storage_backend: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub request_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ConnectorCreateRequest {
    pub owner: String,
    pub organisation_id: String,
    pub connector_type_id: String,
    pub channel: String,
    pub namespace_id: Option<String>,
    #[serde(default)]
    pub definition: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ConnectorPatchRequest {
    pub definition: Option<serde_json::Value>,
    pub channel: Option<String>,
    pub namespace_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct DesiredStateUpdateRequest {
    pub desired_state: DesiredState,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone)]
pub struct ConnectorListResponse {
    pub items: Vec<Connector>,
}
