//! OpenAPI document assembly.
use crate::api::connectors;
use crate::api::system;
use crate::api::types::{
    ConnectorCreateRequest, ConnectorListResponse, ConnectorPatchRequest, DesiredStateUpdateRequest,
    ErrorResponse, HealthStatus, ReadyStatus, SystemInfo,
};
use crate::model::{Connector, ConnectorPhase, ConnectorStatus, DesiredState};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "fleetmanager",
        version = "v1",
        description = "Connector fleet manager HTTP API"
    ),
    paths(
        system::system_info,
        system::system_health,
        system::system_ready,
        connectors::list_connectors,
        connectors::create_connector,
        connectors::get_connector,
        connectors::patch_connector,
        connectors::delete_connector,
        connectors::put_desired_state
    ),
    components(schemas(
        SystemInfo,
        HealthStatus,
        ReadyStatus,
        ErrorResponse,
        Connector,
        ConnectorStatus,
        ConnectorPhase,
        DesiredState,
        ConnectorCreateRequest,
        ConnectorPatchRequest,
        ConnectorListResponse,
        DesiredStateUpdateRequest
    )),
    tags(
        (name = "system", description = "System and readiness endpoints"),
        (name = "connectors", description = "Connector lifecycle management")
    )
)]
pub struct ApiDoc;
