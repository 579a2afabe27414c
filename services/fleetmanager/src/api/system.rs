//! System endpoints: identity, liveness, readiness.
use crate::api::error::ApiError;
use crate::api::types::{HealthStatus, ReadyStatus, SystemInfo};
use crate::app::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

#[utoipa::path(
    get,
    path = "/v1/system/info",
    tag = "system",
    responses(
        (status = 200, description = "Service identity and capabilities", body = SystemInfo)
    )
)]
pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    Json(SystemInfo {
        api_version: state.api_version.clone(),
        storage_backend: state.connectors.backend_name().to_string(),
    })
}

// Liveness: the process is up and can reach its store.
#[utoipa::path(
    get,
    path = "/v1/system/health",
    tag = "system",
    responses(
        (status = 200, description = "Fleet manager health", body = HealthStatus)
    )
)]
pub async fn system_health(State(state): State<AppState>) -> Result<Json<HealthStatus>, ApiError> {
    state
        .connectors
        .health_check()
        .await
        .map_err(|err| ApiError::from_store("storage", err))?;
    Ok(Json(HealthStatus {
        status: "ok".to_string(),
    }))
}

// Readiness: 503 until the startup catalog reconcile has been confirmed
// (either by this replica or by a peer, observed via the gate probe).
#[utoipa::path(
    get,
    path = "/v1/system/ready",
    tag = "system",
    responses(
        (status = 200, description = "Startup reconcile complete", body = ReadyStatus),
        (status = 503, description = "Startup reconcile pending", body = ReadyStatus)
    )
)]
pub async fn system_ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyStatus>) {
    let ready = state.ready.is_released();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadyStatus { ready }))
}
