// Fleet Manager (HTTP + reconcile loop)
// --------------------------------------
// This binary is the control-plane service for connector fleets. It exposes a
// JSON/HTTP API (Axum) for accepting and editing connector requests, and runs
// the reconcile loop that places connectors on remote-cluster namespaces,
// creates deployments, propagates version bumps, and tears connectors down.
//
// Storage model:
// - Pluggable stores: in-memory (default) or Postgres when
//   FLEET_POSTGRES_URL / DATABASE_URL / FLEET_STORAGE=postgres is set.
// - Postgres keeps connector rows, status rows, namespaces, shard metadata
//   revisions, and deployments; migrations run at startup.
// - The memory backend preserves dev behavior and resets on restart.
//
// Startup gating:
// - The listener binds immediately, but requests are served only after the
//   connector catalog has been reconciled against the shared store. On
//   multi-replica deployments only one replica needs to perform the
//   reconcile; the others observe its completion via a checksum probe.
use anyhow::Context;
use fleetmanager::app;
use fleetmanager::config::{CatalogConfig, FleetManagerConfig, StorageBackend};
use fleetmanager::db::ConnectionFactory;
use fleetmanager::observability;
use fleetmanager::reconcile::{ConnectorReconciler, ReconcilerDriver};
use fleetmanager::store::memory::InMemoryStore;
use fleetmanager::store::postgres::PostgresStore;
use fleetmanager::store::{CatalogStore, ClusterStore, ConnectorStore};
use fleetmanager::vault::TmpVaultService;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let metrics_handle = observability::init_observability("fleetmanager");

    let config = FleetManagerConfig::from_env_or_yaml().context("fleet manager config")?;
    let catalog = match &config.catalog_dir {
        Some(dir) => CatalogConfig::load_dir(dir).context("load connector catalog")?,
        None => CatalogConfig::empty(),
    };
    if catalog.is_empty() {
        tracing::warn!("connector catalog is empty; no connector types can be assigned");
    }

    type Stores = (
        Arc<dyn ConnectorStore>,
        Arc<dyn ClusterStore>,
        Arc<dyn CatalogStore>,
        ConnectionFactory,
    );
    let (connectors, clusters, catalog_store, factory): Stores = match config.storage {
        StorageBackend::Memory => {
            let store = Arc::new(InMemoryStore::new());
            (
                store.clone(),
                store.clone(),
                store,
                ConnectionFactory::memory(),
            )
        }
        StorageBackend::Postgres => {
            let pg = config
                .postgres
                .as_ref()
                .context("postgres configuration missing")?;
            let store = Arc::new(PostgresStore::connect(pg).await?);
            let factory = ConnectionFactory::postgres(store.pool().clone());
            (store.clone(), store.clone(), store, factory)
        }
    };
    tracing::info!(backend = connectors.backend_name(), "fleet manager store ready");

    let engine = Arc::new(ConnectorReconciler::new(
        Arc::clone(&connectors),
        clusters,
        catalog_store,
        Arc::new(TmpVaultService::new()),
        factory,
        catalog,
    ));
    let ready = engine.ready_condition();
    let _probe = engine.spawn_startup_probe();

    let driver = ReconcilerDriver::new(
        Arc::clone(&engine),
        Duration::from_secs(config.reconcile_interval_secs),
    );
    driver.start();

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let state = app::AppState {
        api_version: "v1".to_string(),
        connectors,
        ready: ready.clone(),
    };
    let router = app::build_router(state);

    // Bind first so peers and probes can reach us, but hold request serving
    // until the catalog reconcile has been confirmed.
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "waiting for startup reconcile before serving");
    ready.released().await;
    tracing::info!(addr = %config.bind_addr, worker_id = %engine.worker_id(), "fleet manager listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    driver.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
