//! End-to-end reconcile scenarios over the in-memory backend.
//!
//! Each test drives the engine tick by tick the way the periodic driver
//! would, asserting the lifecycle transitions and the invariants around
//! deployments, the version high-water mark, and the startup gate.
use fleetmanager::config::{CatalogConfig, CatalogEntry, ChannelConfig};
use fleetmanager::db::ConnectionFactory;
use fleetmanager::model::{
    Connector, ConnectorPhase, ConnectorStatus, DesiredState, Namespace, NamespacePhase,
};
use fleetmanager::reconcile::{ConnectorReconciler, ReconcileError};
use fleetmanager::store::memory::InMemoryStore;
use fleetmanager::store::{CatalogStore, ClusterStore, ConnectorPatch, ConnectorStore, StoreError};
use fleetmanager::vault::TmpVaultService;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<InMemoryStore>,
    engine: Arc<ConnectorReconciler>,
    ctx: fleetmanager::db::TxContext,
}

fn harness_with_catalog(catalog: CatalogConfig) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let factory = ConnectionFactory::memory();
    let ctx = factory.new_context();
    let engine = Arc::new(ConnectorReconciler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(TmpVaultService::new()),
        factory,
        catalog,
    ));
    Harness { store, engine, ctx }
}

fn harness() -> Harness {
    harness_with_catalog(stable_catalog(1))
}

fn stable_catalog(revision: i64) -> CatalogConfig {
    CatalogConfig::from_entries(vec![CatalogEntry {
        connector_type_id: "debezium".to_string(),
        channel: "stable".to_string(),
        channel_config: ChannelConfig {
            shard_metadata: json!({ "connector_revision": revision }),
        },
    }])
}

fn connector_request(id: &str, namespace_id: Option<&str>) -> Connector {
    Connector {
        id: id.to_string(),
        owner: "alice".to_string(),
        organisation_id: "org-1".to_string(),
        connector_type_id: "debezium".to_string(),
        channel: "stable".to_string(),
        desired_state: DesiredState::Ready,
        namespace_id: namespace_id.map(str::to_string),
        version: 1,
        definition: json!({ "topic": "orders" }),
        status: ConnectorStatus {
            id: id.to_string(),
            namespace_id: None,
            phase: ConnectorPhase::Assigning,
        },
    }
}

fn ready_namespace(id: &str, cluster_id: &str) -> Namespace {
    Namespace {
        id: id.to_string(),
        cluster_id: cluster_id.to_string(),
        tenant_owner: Some("alice".to_string()),
        tenant_organisation: Some("org-1".to_string()),
        phase: NamespacePhase::Ready,
    }
}

async fn tick(harness: &Harness) -> Vec<ReconcileError> {
    harness.engine.reconcile().await
}

async fn tick_clean(harness: &Harness) {
    let errs = tick(harness).await;
    assert!(errs.is_empty(), "unexpected tick errors: {errs:?}");
}

#[tokio::test]
async fn fresh_assignment_creates_deployment() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c1", Some("ns-1")))
        .await
        .unwrap();

    tick_clean(&harness).await;

    let connector = harness.store.get("c1").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigned);
    assert_eq!(connector.status.namespace_id.as_deref(), Some("ns-1"));

    let deployment = harness
        .store
        .get_deployment_by_connector_id(&harness.ctx, "c1")
        .await
        .unwrap();
    assert_eq!(deployment.cluster_id, "cl-1");
    assert_eq!(deployment.namespace_id, "ns-1");
    assert_eq!(deployment.connector_version, connector.version);
    let shard = harness
        .store
        .get_latest_connector_shard_metadata("debezium", "stable")
        .await
        .unwrap();
    assert_eq!(deployment.connector_shard_metadata_id, shard.id);
}

#[tokio::test]
async fn assignment_waits_until_a_namespace_is_available() {
    let harness = harness();
    harness
        .store
        .create(connector_request("c1", Some("ns-1")))
        .await
        .unwrap();

    // No eligible namespace yet: no mutation, no error, retry next tick.
    tick_clean(&harness).await;
    let connector = harness.store.get("c1").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigning);
    assert!(matches!(
        harness
            .store
            .get_deployment_by_connector_id(&harness.ctx, "c1")
            .await,
        Err(StoreError::NotFound(_))
    ));

    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    tick_clean(&harness).await;
    let connector = harness.store.get("c1").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigned);
}

#[tokio::test]
async fn version_bump_propagates_once_and_advances_the_high_water_mark() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c2", Some("ns-1")))
        .await
        .unwrap();
    tick_clean(&harness).await;

    // Several edits between ticks converge in one application.
    for _ in 0..3 {
        harness
            .store
            .update_definition(
                "c2",
                ConnectorPatch {
                    definition: Some(json!({ "topic": "orders-v2" })),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }
    let connector = harness.store.get("c2").await.unwrap();
    assert_eq!(connector.version, 4);

    tick_clean(&harness).await;
    let deployment = harness
        .store
        .get_deployment_by_connector_id(&harness.ctx, "c2")
        .await
        .unwrap();
    assert_eq!(deployment.connector_version, 4);
    assert_eq!(harness.engine.last_propagated_version(), 4);

    // A converged tick leaves both the deployment and the mark untouched.
    tick_clean(&harness).await;
    let deployment = harness
        .store
        .get_deployment_by_connector_id(&harness.ctx, "c2")
        .await
        .unwrap();
    assert_eq!(deployment.connector_version, 4);
    assert_eq!(harness.engine.last_propagated_version(), 4);
}

#[tokio::test]
async fn deletion_waits_for_cluster_side_teardown() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c3", Some("ns-1")))
        .await
        .unwrap();
    tick_clean(&harness).await;

    harness
        .store
        .set_desired_state("c3", DesiredState::Deleted, Some(ConnectorPhase::Deleting))
        .await
        .unwrap();

    // Deployment still present: the cluster agent is tearing it down, so the
    // connector stays in deleting.
    tick_clean(&harness).await;
    let connector = harness.store.get("c3").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Deleting);

    // External teardown completes; the next tick observes the missing
    // deployment, marks the row deleted, and hard-deletes it.
    harness.store.delete_deployment("c3").await.unwrap();
    tick_clean(&harness).await;
    assert!(matches!(
        harness.store.get("c3").await,
        Err(StoreError::NotFound(_))
    ));

    // A hard-deleted connector never reappears.
    tick_clean(&harness).await;
    assert!(matches!(
        harness.store.get("c3").await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn unassign_round_trip_ends_with_a_fresh_deployment() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create_namespace(ready_namespace("ns-2", "cl-2"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c4", Some("ns-1")))
        .await
        .unwrap();
    tick_clean(&harness).await;

    // Unassign: the agent has released the deployment and the connector sits
    // in desired=unassigned, phase=deleted.
    harness.store.delete_deployment("c4").await.unwrap();
    harness
        .store
        .set_desired_state("c4", DesiredState::Unassigned, Some(ConnectorPhase::Deleted))
        .await
        .unwrap();

    tick_clean(&harness).await;
    let connector = harness.store.get("c4").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigning);
    assert!(connector.namespace_id.is_none());

    // The user points the connector at another namespace and asks for it to
    // run again.
    harness
        .store
        .update_definition(
            "c4",
            ConnectorPatch {
                namespace_id: Some("ns-2".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    harness
        .store
        .set_desired_state("c4", DesiredState::Ready, None)
        .await
        .unwrap();

    tick_clean(&harness).await;
    let connector = harness.store.get("c4").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigned);
    assert_eq!(connector.status.namespace_id.as_deref(), Some("ns-2"));
    let deployment = harness
        .store
        .get_deployment_by_connector_id(&harness.ctx, "c4")
        .await
        .unwrap();
    assert_eq!(deployment.cluster_id, "cl-2");
    assert_eq!(deployment.connector_version, connector.version);
}

#[tokio::test]
async fn bad_catalog_aborts_the_tick_and_keeps_the_gate_closed() {
    let catalog = CatalogConfig::from_entries(vec![CatalogEntry {
        connector_type_id: "debezium".to_string(),
        channel: "stable".to_string(),
        channel_config: ChannelConfig {
            shard_metadata: json!({}),
        },
    }]);
    let harness = harness_with_catalog(catalog);
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c1", Some("ns-1")))
        .await
        .unwrap();

    let errs = tick(&harness).await;
    assert_eq!(errs.len(), 1);
    assert!(matches!(errs[0], ReconcileError::BadCatalog { .. }));
    assert!(!harness.engine.ready_condition().is_released());

    // The phase passes were skipped: the connector was not assigned.
    let connector = harness.store.get("c1").await.unwrap();
    assert_eq!(connector.status.phase, ConnectorPhase::Assigning);

    // The tick retries from the top and keeps failing until config is fixed.
    let errs = tick(&harness).await;
    assert_eq!(errs.len(), 1);
    assert!(!harness.engine.ready_condition().is_released());
}

#[tokio::test]
async fn gate_releases_after_local_startup_reconcile() {
    let harness = harness();
    assert!(!harness.engine.ready_condition().is_released());
    tick_clean(&harness).await;
    assert!(harness.engine.ready_condition().is_released());
}

#[tokio::test]
async fn gate_releases_via_peer_reconcile() {
    // Replica A reconciles the catalog into the shared store.
    let store = Arc::new(InMemoryStore::new());
    let replica_a = Arc::new(ConnectorReconciler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(TmpVaultService::new()),
        ConnectionFactory::memory(),
        stable_catalog(1),
    ));
    assert!(replica_a.reconcile().await.is_empty());

    // Replica B shares the store and never ticks; its probe observes the
    // reconciled catalog and releases the gate.
    let replica_b = Arc::new(ConnectorReconciler::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(TmpVaultService::new()),
        ConnectionFactory::memory(),
        stable_catalog(1),
    ));
    let ready = replica_b.ready_condition();
    assert!(!ready.is_released());
    let _probe = replica_b.spawn_startup_probe();
    tokio::time::timeout(Duration::from_secs(2), ready.released())
        .await
        .expect("gate released via peer");
}

#[tokio::test]
async fn converged_fleet_ticks_are_no_ops() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c1", Some("ns-1")))
        .await
        .unwrap();
    tick_clean(&harness).await;

    let before = serde_json::to_value(harness.store.list().await.unwrap()).unwrap();
    let deployment_before = serde_json::to_value(
        harness
            .store
            .get_deployment_by_connector_id(&harness.ctx, "c1")
            .await
            .unwrap(),
    )
    .unwrap();

    for _ in 0..3 {
        tick_clean(&harness).await;
    }

    let after = serde_json::to_value(harness.store.list().await.unwrap()).unwrap();
    let deployment_after = serde_json::to_value(
        harness
            .store
            .get_deployment_by_connector_id(&harness.ctx, "c1")
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(before, after);
    assert_eq!(deployment_before, deployment_after);
}

#[tokio::test]
async fn startup_reconcile_prunes_unconfigured_metadata_and_orphaned_deployments() {
    let harness = harness();
    // Leftovers from a previous configuration / crashed start.
    harness
        .store
        .put_connector_shard_metadata(fleetmanager::model::ShardMetadata {
            id: 0,
            connector_type_id: "legacy".to_string(),
            channel: "stable".to_string(),
            revision: 1,
            shard_metadata: json!({ "connector_revision": 1 }),
        })
        .await
        .unwrap();
    harness
        .store
        .save_deployment(
            &harness.ctx,
            &fleetmanager::model::Deployment {
                id: "d-ghost".to_string(),
                connector_id: "ghost".to_string(),
                cluster_id: "cl-1".to_string(),
                namespace_id: "ns-1".to_string(),
                connector_version: 1,
                connector_shard_metadata_id: 99,
                status: String::new(),
            },
        )
        .await
        .unwrap();

    tick_clean(&harness).await;

    assert!(harness
        .store
        .get_latest_connector_shard_metadata("legacy", "stable")
        .await
        .is_err());
    assert!(matches!(
        harness
            .store
            .get_deployment_by_connector_id(&harness.ctx, "ghost")
            .await,
        Err(StoreError::NotFound(_))
    ));
    // The configured entry was written.
    let shard = harness
        .store
        .get_latest_connector_shard_metadata("debezium", "stable")
        .await
        .unwrap();
    assert_eq!(shard.revision, 1);
}

#[tokio::test]
async fn high_water_mark_never_regresses() {
    let harness = harness();
    harness
        .store
        .create_namespace(ready_namespace("ns-1", "cl-1"))
        .await
        .unwrap();
    harness
        .store
        .create(connector_request("c1", Some("ns-1")))
        .await
        .unwrap();
    tick_clean(&harness).await;

    let mut last = harness.engine.last_propagated_version();
    for _ in 0..3 {
        harness
            .store
            .update_definition("c1", ConnectorPatch::default())
            .await
            .unwrap();
        tick_clean(&harness).await;
        let current = harness.engine.last_propagated_version();
        assert!(current >= last);
        last = current;
    }
}
