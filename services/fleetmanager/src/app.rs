//! Fleet-manager HTTP application wiring.
//!
//! # Purpose
//! Builds the Axum router, configures middleware, and defines the shared
//! application state injected into handlers.
//!
//! # Notes
//! This module centralizes route composition to keep `main` small and
//! testable. The listener itself only starts serving once the startup gate
//! has released; `/v1/system/ready` exposes the same condition for probes.
use crate::api;
use crate::api::openapi::ApiDoc;
use crate::observability;
use crate::reconcile::ReadyCondition;
use crate::store::ConnectorStore;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use utoipa::OpenApi;

#[derive(Clone)]
pub struct AppState {
    pub api_version: String,
    pub connectors: Arc<dyn ConnectorStore>,
    pub ready: ReadyCondition,
}

pub fn build_router(state: AppState) -> Router {
    let trace_layer =
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            let parent = observability::trace_context_from_headers(request.headers());
            let span = tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version()
            );
            span.set_parent(parent);
            span
        });

    Router::new()
        .route(
            "/v1/system/info",
            axum::routing::get(api::system::system_info),
        )
        .route(
            "/v1/system/health",
            axum::routing::get(api::system::system_health),
        )
        .route(
            "/v1/system/ready",
            axum::routing::get(api::system::system_ready),
        )
        .route(
            "/v1/connectors",
            axum::routing::get(api::connectors::list_connectors)
                .post(api::connectors::create_connector),
        )
        .route(
            "/v1/connectors/:id",
            axum::routing::get(api::connectors::get_connector)
                .patch(api::connectors::patch_connector)
                .delete(api::connectors::delete_connector),
        )
        .route(
            "/v1/connectors/:id/desired-state",
            axum::routing::put(api::connectors::put_desired_state),
        )
        .merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/v1/openapi.json", ApiDoc::openapi()),
        )
        .layer(trace_layer)
        .with_state(state)
}
