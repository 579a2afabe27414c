//! Connector endpoints: intake, edits, and intent flips.
//!
//! These are the external mutations the reconcile loop reacts to. Accepted
//! requests start in `desired_state=ready, phase=assigning`; edits bump the
//! connector version; deletion intent moves the connector into the deleting
//! phase for teardown observation.
use crate::api::error::ApiError;
use crate::api::types::{
    ConnectorCreateRequest, ConnectorListResponse, ConnectorPatchRequest, DesiredStateUpdateRequest,
    ErrorResponse,
};
use crate::app::AppState;
use crate::model::{Connector, ConnectorPhase, ConnectorStatus, DesiredState};
use crate::store::ConnectorPatch;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/v1/connectors",
    tag = "connectors",
    responses(
        (status = 200, description = "List connectors", body = ConnectorListResponse)
    )
)]
pub async fn list_connectors(
    State(state): State<AppState>,
) -> Result<Json<ConnectorListResponse>, ApiError> {
    let items = state
        .connectors
        .list()
        .await
        .map_err(|err| ApiError::from_store("connectors", err))?;
    Ok(Json(ConnectorListResponse { items }))
}

// Accept a connector request. The reconcile loop picks it up from the
// `assigning` phase on its next tick.
#[utoipa::path(
    post,
    path = "/v1/connectors",
    tag = "connectors",
    request_body = ConnectorCreateRequest,
    responses(
        (status = 201, description = "Connector accepted", body = Connector),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    )
)]
pub async fn create_connector(
    State(state): State<AppState>,
    Json(body): Json<ConnectorCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.owner.is_empty() || body.organisation_id.is_empty() {
        return Err(ApiError::validation("owner and organisation_id are required"));
    }
    if body.connector_type_id.is_empty() || body.channel.is_empty() {
        return Err(ApiError::validation(
            "connector_type_id and channel are required",
        ));
    }

    let id = Uuid::new_v4().to_string();
    let connector = Connector {
        status: ConnectorStatus {
            id: id.clone(),
            namespace_id: None,
            phase: ConnectorPhase::Assigning,
        },
        id,
        owner: body.owner,
        organisation_id: body.organisation_id,
        connector_type_id: body.connector_type_id,
        channel: body.channel,
        desired_state: DesiredState::Ready,
        namespace_id: body.namespace_id,
        version: 1,
        definition: body.definition,
    };
    let created = state
        .connectors
        .create(connector)
        .await
        .map_err(|err| ApiError::from_store("connector", err))?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/v1/connectors/{id}",
    tag = "connectors",
    params(
        ("id" = String, Path, description = "Connector identifier")
    ),
    responses(
        (status = 200, description = "Fetch connector", body = Connector),
        (status = 404, description = "Connector not found", body = ErrorResponse)
    )
)]
pub async fn get_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Connector>, ApiError> {
    let connector = state
        .connectors
        .get(&id)
        .await
        .map_err(|err| ApiError::from_store("connector", err))?;
    Ok(Json(connector))
}

// Apply a user edit. Every applied edit bumps the connector version, which
// the update pass propagates to the deployment.
#[utoipa::path(
    patch,
    path = "/v1/connectors/{id}",
    tag = "connectors",
    params(
        ("id" = String, Path, description = "Connector identifier")
    ),
    request_body = ConnectorPatchRequest,
    responses(
        (status = 200, description = "Connector updated", body = Connector),
        (status = 404, description = "Connector not found", body = ErrorResponse)
    )
)]
pub async fn patch_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<ConnectorPatchRequest>,
) -> Result<Json<Connector>, ApiError> {
    let patch = ConnectorPatch {
        definition: body.definition,
        channel: body.channel,
        namespace_id: body.namespace_id,
    };
    let updated = state
        .connectors
        .update_definition(&id, patch)
        .await
        .map_err(|err| ApiError::from_store("connector", err))?;
    Ok(Json(updated))
}

// Record deletion intent. The reconcile loop waits for cluster-side teardown
// and eventually hard-deletes the row.
#[utoipa::path(
    delete,
    path = "/v1/connectors/{id}",
    tag = "connectors",
    params(
        ("id" = String, Path, description = "Connector identifier")
    ),
    responses(
        (status = 204, description = "Deletion recorded"),
        (status = 404, description = "Connector not found", body = ErrorResponse)
    )
)]
pub async fn delete_connector(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state
        .connectors
        .set_desired_state(&id, DesiredState::Deleted, Some(ConnectorPhase::Deleting))
        .await
        .map_err(|err| ApiError::from_store("connector", err))?;
    Ok(StatusCode::NO_CONTENT)
}

// Flip the desired state. Unassignment releases the namespace so the
// connector can be re-placed; deletion starts teardown.
#[utoipa::path(
    put,
    path = "/v1/connectors/{id}/desired-state",
    tag = "connectors",
    params(
        ("id" = String, Path, description = "Connector identifier")
    ),
    request_body = DesiredStateUpdateRequest,
    responses(
        (status = 204, description = "Desired state recorded"),
        (status = 404, description = "Connector not found", body = ErrorResponse)
    )
)]
pub async fn put_desired_state(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Json(body): Json<DesiredStateUpdateRequest>,
) -> Result<StatusCode, ApiError> {
    let phase = match body.desired_state {
        DesiredState::Ready => None,
        DesiredState::Unassigned => Some(ConnectorPhase::Deleted),
        DesiredState::Deleted => Some(ConnectorPhase::Deleting),
    };
    state
        .connectors
        .set_desired_state(&id, body.desired_state, phase)
        .await
        .map_err(|err| ApiError::from_store("connector", err))?;
    Ok(StatusCode::NO_CONTENT)
}
