//! HTTP API smoke tests over the in-memory backend.
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleetmanager::app::{AppState, build_router};
use fleetmanager::reconcile::ReadyCondition;
use fleetmanager::store::memory::InMemoryStore;
use std::sync::Arc;
use tower::ServiceExt;

fn test_state() -> (AppState, ReadyCondition) {
    let ready = ReadyCondition::new();
    let state = AppState {
        api_version: "v1".to_string(),
        connectors: Arc::new(InMemoryStore::new()),
        ready: ready.clone(),
    };
    (state, ready)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn readiness_reflects_the_startup_gate() {
    let (state, ready) = test_state();
    let app = build_router(state);

    let request = Request::builder()
        .uri("/v1/system/ready")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("ready");
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    ready.release();
    let request = Request::builder()
        .uri("/v1/system/ready")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("ready");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["ready"], serde_json::json!(true));
}

#[tokio::test]
async fn connector_lifecycle_over_http() {
    let (state, ready) = test_state();
    ready.release();
    let app = build_router(state);

    // Intake.
    let create = json_request(
        "POST",
        "/v1/connectors",
        serde_json::json!({
            "owner": "alice",
            "organisation_id": "org-1",
            "connector_type_id": "debezium",
            "channel": "stable",
            "namespace_id": "ns-1",
            "definition": { "topic": "orders" }
        }),
    );
    let response = app.clone().oneshot(create).await.expect("create");
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = read_json(response).await;
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(created["desired_state"], "ready");
    assert_eq!(created["status"]["phase"], "assigning");
    assert_eq!(created["version"], 1);

    // Listing sees it.
    let list = Request::builder()
        .uri("/v1/connectors")
        .body(Body::empty())
        .expect("list");
    let response = app.clone().oneshot(list).await.expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["items"].as_array().unwrap().len(), 1);

    // A user edit bumps the version.
    let patch = json_request(
        "PATCH",
        &format!("/v1/connectors/{id}"),
        serde_json::json!({ "definition": { "topic": "orders-v2" } }),
    );
    let response = app.clone().oneshot(patch).await.expect("patch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["version"], 2);

    // Unassign intent.
    let unassign = json_request(
        "PUT",
        &format!("/v1/connectors/{id}/desired-state"),
        serde_json::json!({ "desired_state": "unassigned" }),
    );
    let response = app.clone().oneshot(unassign).await.expect("unassign");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let get = Request::builder()
        .uri(format!("/v1/connectors/{id}"))
        .body(Body::empty())
        .expect("get");
    let response = app.clone().oneshot(get).await.expect("get");
    let payload = read_json(response).await;
    assert_eq!(payload["desired_state"], "unassigned");
    assert_eq!(payload["status"]["phase"], "deleted");

    // Deletion intent.
    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/v1/connectors/{id}"))
        .body(Body::empty())
        .expect("delete");
    let response = app.clone().oneshot(delete).await.expect("delete");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let get = Request::builder()
        .uri(format!("/v1/connectors/{id}"))
        .body(Body::empty())
        .expect("get");
    let response = app.clone().oneshot(get).await.expect("get");
    let payload = read_json(response).await;
    assert_eq!(payload["desired_state"], "deleted");
    assert_eq!(payload["status"]["phase"], "deleting");
}

#[tokio::test]
async fn create_rejects_incomplete_requests() {
    let (state, ready) = test_state();
    ready.release();
    let app = build_router(state);

    let create = json_request(
        "POST",
        "/v1/connectors",
        serde_json::json!({
            "owner": "",
            "organisation_id": "org-1",
            "connector_type_id": "debezium",
            "channel": "stable"
        }),
    );
    let response = app.clone().oneshot(create).await.expect("create");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_connector_is_a_404() {
    let (state, ready) = test_state();
    ready.release();
    let app = build_router(state);

    let get = Request::builder()
        .uri("/v1/connectors/nope")
        .body(Body::empty())
        .expect("get");
    let response = app.clone().oneshot(get).await.expect("get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/v1/connectors/nope")
        .body(Body::empty())
        .expect("delete");
    let response = app.clone().oneshot(delete).await.expect("delete");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (state, _ready) = test_state();
    let app = build_router(state);

    let request = Request::builder()
        .uri("/v1/system/health")
        .body(Body::empty())
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("health");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["status"], "ok");
}
