//! Connector reconciliation engine.
//!
//! # Purpose
//! A periodic control loop that drives every connector record through its
//! lifecycle: accepted request, namespace placement, deployment creation,
//! version propagation on user edits, and deletion with teardown observation.
//!
//! # Shape of a tick
//! One [`ConnectorReconciler::reconcile`] call per driver tick:
//! 1. Until the startup gate has released, run the one-shot catalog
//!    reconcile. Any catalog error aborts the whole tick; the next tick
//!    retries from the top.
//! 2. Lazily create the per-process transaction context.
//! 3. Run the five phase passes in order, each independently. Deletion
//!    transitions run before version propagation so a connector deleted and
//!    edited on the same tick is not uselessly redeployed.
//!
//! Each pass scans the connector table with its predicate and runs the
//! per-row transition inside its own transaction with a row lock; per-row
//! failures are logged and counted but never abort sibling rows or passes.
//!
//! # Replicas
//! Multiple fleet-manager replicas tick concurrently against the shared
//! database; per-row `SELECT ... FOR UPDATE` locks keep them from racing the
//! same connector, and the startup-gate probe lets replicas that did not run
//! the catalog reconcile start serving once a peer has.
mod catalog;
mod driver;
mod readiness;

pub use catalog::shard_metadata_from_entry;
pub use driver::ReconcilerDriver;
pub use readiness::ReadyCondition;

use crate::config::CatalogConfig;
use crate::db::{ConnectionFactory, TxContext, TxError, in_transaction};
use crate::model::{Connector, ConnectorPhase, ConnectorStatus, Deployment, DesiredState};
use crate::store::{
    CatalogStore, ClusterStore, ConnectorSelector, ConnectorStore, StoreError,
};
use crate::vault::VaultService;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Cadence of the startup-gate probe checking whether a peer replica has
/// already reconciled the catalog.
const CHECK_CATALOG_ENTRIES_INTERVAL: Duration = Duration::from_secs(5);

/// Everything that can go wrong during a reconcile tick, tagged by kind.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A configured catalog entry is unusable. Fatal to the tick.
    #[error("bad catalog entry for connector type {connector_type_id} channel {channel}: {reason}")]
    BadCatalog {
        connector_type_id: String,
        channel: String,
        reason: String,
    },
    /// Store read/write failure; per-row occurrences are retried next tick.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Transaction begin/resolve failure.
    #[error(transparent)]
    Tx(#[from] TxError),
    /// Both the row mutation and the post-commit registration failed.
    #[error("multiple errors reconciling connector {connector_id}: {first}; {second}")]
    Multiple {
        connector_id: String,
        first: Box<ReconcileError>,
        second: Box<ReconcileError>,
    },
}

/// The reconciliation engine instance.
///
/// Owns only transient state: the singleton transaction context, the
/// version high-water mark, the startup flag, and the readiness latch. All
/// durable state lives behind the store traits.
pub struct ConnectorReconciler {
    worker_id: String,
    connectors: Arc<dyn ConnectorStore>,
    clusters: Arc<dyn ClusterStore>,
    catalog_store: Arc<dyn CatalogStore>,
    vault: Arc<dyn VaultService>,
    factory: ConnectionFactory,
    catalog: CatalogConfig,
    ctx: OnceCell<TxContext>,
    /// Largest connector version this replica has propagated to its
    /// deployment. Advanced only by post-commit actions, so it moves forward
    /// only on durable success; resets to 0 on restart, which just makes the
    /// first tick re-scan (the update pass is idempotent).
    last_version: Arc<AtomicI64>,
    startup_done: AtomicBool,
    ready: ReadyCondition,
}

impl ConnectorReconciler {
    pub fn new(
        connectors: Arc<dyn ConnectorStore>,
        clusters: Arc<dyn ClusterStore>,
        catalog_store: Arc<dyn CatalogStore>,
        vault: Arc<dyn VaultService>,
        factory: ConnectionFactory,
        catalog: CatalogConfig,
    ) -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            connectors,
            clusters,
            catalog_store,
            vault,
            factory,
            catalog,
            ctx: OnceCell::new(),
            last_version: Arc::new(AtomicI64::new(0)),
            startup_done: AtomicBool::new(false),
            ready: ReadyCondition::new(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// The latch the API server waits on before accepting requests.
    pub fn ready_condition(&self) -> ReadyCondition {
        self.ready.clone()
    }

    /// Secret backend handle, carried for deployment-secret passes.
    pub fn vault(&self) -> &Arc<dyn VaultService> {
        &self.vault
    }

    /// Current version high-water mark of this replica.
    pub fn last_propagated_version(&self) -> i64 {
        self.last_version.load(Ordering::Acquire)
    }

    /// One reconcile tick. Returns every error retained by the tick; an
    /// empty bag means the fleet converged (or was already converged).
    pub async fn reconcile(&self) -> Vec<ReconcileError> {
        tracing::debug!(worker_id = %self.worker_id, "reconciling connectors");
        metrics::counter!("fleet_reconcile_ticks_total").increment(1);
        let mut errs = Vec::new();

        if !self.startup_done.load(Ordering::Acquire) {
            tracing::debug!("reconciling startup connector catalog updates");
            if let Err(err) = self.reconcile_catalog().await {
                return vec![err];
            }
            self.startup_done.store(true, Ordering::Release);
            self.ready.release();
            tracing::debug!("catalog updates processed");
        }

        // Connectors in "ready" desired state waiting for namespace placement.
        self.do_reconcile(
            &mut errs,
            "assigning",
            ConnectorSelector::DesiredAndPhase {
                desired: DesiredState::Ready,
                phase: ConnectorPhase::Assigning,
                namespace_required: true,
            },
            |ctx, connector| self.reconcile_assigning(ctx, connector),
        )
        .await;

        // Unassigned connectors return to the placement pool.
        self.do_reconcile(
            &mut errs,
            "unassigned",
            ConnectorSelector::DesiredAndPhase {
                desired: DesiredState::Unassigned,
                phase: ConnectorPhase::Deleted,
                namespace_required: false,
            },
            |ctx, connector| self.reconcile_unassigned(ctx, connector),
        )
        .await;

        // Deleting connectors waiting for cluster-side teardown.
        self.do_reconcile(
            &mut errs,
            "deleting",
            ConnectorSelector::DesiredAndPhase {
                desired: DesiredState::Deleted,
                phase: ConnectorPhase::Deleting,
                namespace_required: false,
            },
            |ctx, connector| self.reconcile_deleting(ctx, connector),
        )
        .await;

        // Deleted connectors with no deployment left: hard delete.
        self.do_reconcile(
            &mut errs,
            "deleted",
            ConnectorSelector::DesiredAndPhaseIn {
                desired: DesiredState::Deleted,
                phases: vec![ConnectorPhase::Assigning, ConnectorPhase::Deleted],
            },
            |ctx, connector| self.reconcile_deleted(ctx, connector),
        )
        .await;

        // Edited connectors whose deployment lags behind. Runs after the
        // deletion passes so same-tick deletions are not redeployed.
        self.do_reconcile(
            &mut errs,
            "updated",
            ConnectorSelector::VersionAbove {
                version: self.last_version.load(Ordering::Acquire),
                exclude_phases: vec![
                    ConnectorPhase::Assigning,
                    ConnectorPhase::Deleting,
                    ConnectorPhase::Deleted,
                ],
            },
            |ctx, connector| self.reconcile_connector_update(ctx, connector),
        )
        .await;

        errs
    }

    /// One-shot startup catalog reconciliation.
    ///
    /// Prunes catalog rows that are neither configured nor referenced, then
    /// upserts every configured entry, then prunes orphaned deployments from
    /// prior crashed starts. Idempotent, so concurrent replicas converge.
    async fn reconcile_catalog(&self) -> Result<(), ReconcileError> {
        let removed = self
            .catalog_store
            .delete_unused_and_not_in_catalog(&self.catalog.keys())
            .await?;
        if removed > 0 {
            tracing::info!(removed, "deleted unused catalog shard metadata");
        }

        for entry in self.catalog.entries() {
            let metadata = shard_metadata_from_entry(entry)?;
            self.catalog_store
                .put_connector_shard_metadata(metadata)
                .await?;
        }

        let pruned = self.clusters.cleanup_deployments().await?;
        if pruned > 0 {
            tracing::info!(pruned, "cleaned up orphaned deployments");
        }
        Ok(())
    }

    /// Spawn the startup-gate probe.
    ///
    /// Replicas that are not the one running the catalog reconcile release
    /// their gate as soon as the stored catalog matches the configured one,
    /// checked every five seconds. Exits once the gate releases.
    pub fn spawn_startup_probe(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while !engine.startup_done.load(Ordering::Acquire) {
                tracing::debug!("waiting for startup connector catalog updates");
                let done = match engine.catalog.desired_shard_metadata() {
                    Err(err) => {
                        tracing::error!(error = %err, "configured catalog is not loadable");
                        false
                    }
                    Ok(desired) => match engine
                        .catalog_store
                        .catalog_entries_reconciled(&desired)
                        .await
                    {
                        Ok(done) => done,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to check catalog entries");
                            false
                        }
                    },
                };
                if done {
                    engine.startup_done.store(true, Ordering::Release);
                    break;
                }
                tokio::time::sleep(CHECK_CATALOG_ENTRIES_INTERVAL).await;
            }
            tracing::debug!("startup connector catalog updates done");
            engine.ready.release();
        })
    }

    /// Lazily created singleton context; every per-row transaction of this
    /// replica runs through it, one at a time.
    async fn context(&self) -> TxContext {
        self.ctx
            .get_or_init(|| async { self.factory.new_context() })
            .await
            .clone()
    }

    /// Scan one slice of the connector table and run `reconcile_fn` for each
    /// row inside its own transaction.
    ///
    /// Per-row errors are logged with their identifying fields and counted;
    /// they do not abort the scan. Only a scan-level failure lands in the
    /// tick's error bag.
    async fn do_reconcile<F, Fut>(
        &self,
        errs: &mut Vec<ReconcileError>,
        pass: &'static str,
        selector: ConnectorSelector,
        reconcile_fn: F,
    ) where
        F: Fn(TxContext, Connector) -> Fut,
        Fut: Future<Output = Result<(), ReconcileError>>,
    {
        tracing::debug!(pass, "reconciling connectors");
        let rows = match self.connectors.select(&selector).await {
            Ok(rows) => rows,
            Err(err) => {
                errs.push(err.into());
                return;
            }
        };

        let ctx = self.context().await;
        let reconcile_fn = &reconcile_fn;
        let mut count = 0usize;
        let mut row_errors = 0usize;
        for connector in rows {
            let connector_id = connector.id.clone();
            let current_phase = connector.status.phase;
            let result = in_transaction(&ctx, move |txc| async move {
                // Row-level lock so replicas cannot race this transition.
                // A vanished row means another replica finished it.
                match self.connectors.lock_row(&txc, &connector.id).await {
                    Ok(()) => {}
                    Err(StoreError::NotFound(_)) => return Ok(()),
                    Err(err) => return Err(err.into()),
                }
                reconcile_fn(txc.clone(), connector).await
            })
            .await;

            match result {
                Ok(()) => count += 1,
                Err(err) => {
                    row_errors += 1;
                    tracing::error!(
                        pass,
                        connector_id = %connector_id,
                        current_phase = ?current_phase,
                        error = %err,
                        "failed to reconcile connector"
                    );
                    metrics::counter!("fleet_reconcile_errors_total", "pass" => pass)
                        .increment(1);
                }
            }
        }

        if count == 0 && row_errors == 0 {
            tracing::debug!(pass, "no connectors to reconcile");
        } else {
            tracing::debug!(pass, count, row_errors, "reconciled connectors");
            metrics::counter!("fleet_connectors_reconciled_total", "pass" => pass)
                .increment(count as u64);
        }
    }

    /// assigning -> assigned: place the connector on an eligible namespace
    /// and create its deployment. All writes share the row transaction.
    async fn reconcile_assigning(
        &self,
        ctx: TxContext,
        connector: Connector,
    ) -> Result<(), ReconcileError> {
        let namespace = self
            .clusters
            .find_available_namespace(
                &connector.owner,
                &connector.organisation_id,
                connector.namespace_id.as_deref(),
            )
            .await?;
        let Some(namespace) = namespace else {
            // No eligible namespace right now; try again next tick.
            return Ok(());
        };

        let shard_metadata = self
            .catalog_store
            .get_latest_connector_shard_metadata(&connector.connector_type_id, &connector.channel)
            .await?;

        let status = ConnectorStatus {
            id: connector.id.clone(),
            namespace_id: Some(namespace.id.clone()),
            phase: ConnectorPhase::Assigned,
        };
        self.connectors.save_status(&ctx, status).await?;

        let deployment = Deployment {
            id: Uuid::new_v4().to_string(),
            connector_id: connector.id.clone(),
            cluster_id: namespace.cluster_id,
            namespace_id: namespace.id,
            connector_version: connector.version,
            connector_shard_metadata_id: shard_metadata.id,
            status: String::new(),
        };
        self.clusters.save_deployment(&ctx, &deployment).await?;
        Ok(())
    }

    /// unassigned/deleted -> assigning: return the connector to the
    /// placement pool with no namespace.
    async fn reconcile_unassigned(
        &self,
        ctx: TxContext,
        connector: Connector,
    ) -> Result<(), ReconcileError> {
        self.connectors.clear_namespace(&ctx, &connector.id).await?;
        let status = ConnectorStatus {
            id: connector.id.clone(),
            namespace_id: None,
            phase: ConnectorPhase::Assigning,
        };
        self.connectors.save_status(&ctx, status).await?;
        Ok(())
    }

    /// deleting -> deleted, once the cluster agent has torn the deployment
    /// down. A still-present deployment means teardown is in flight.
    async fn reconcile_deleting(
        &self,
        ctx: TxContext,
        connector: Connector,
    ) -> Result<(), ReconcileError> {
        match self
            .clusters
            .get_deployment_by_connector_id(&ctx, &connector.id)
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                self.connectors.clear_namespace(&ctx, &connector.id).await?;
                let status = ConnectorStatus {
                    id: connector.id.clone(),
                    namespace_id: None,
                    phase: ConnectorPhase::Deleted,
                };
                self.connectors.save_status(&ctx, status).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// deleted -> gone: the terminal transition.
    async fn reconcile_deleted(
        &self,
        ctx: TxContext,
        connector: Connector,
    ) -> Result<(), ReconcileError> {
        self.connectors.delete(&ctx, &connector.id).await?;
        Ok(())
    }

    /// Propagate a bumped connector version to its deployment, then advance
    /// the high-water mark after commit.
    ///
    /// The post-commit registration is attempted even when the mutation
    /// failed; if both fail the errors are combined. On rollback the queued
    /// advance never fires, so the mark only tracks durable propagation.
    async fn reconcile_connector_update(
        &self,
        ctx: TxContext,
        connector: Connector,
    ) -> Result<(), ReconcileError> {
        let mut result: Option<ReconcileError> = None;

        match self
            .clusters
            .get_deployment_by_connector_id(&ctx, &connector.id)
            .await
        {
            Err(err) => result = Some(err.into()),
            Ok(mut deployment) => {
                if deployment.connector_version != connector.version {
                    deployment.connector_version = connector.version;
                    if let Err(err) = self.clusters.save_deployment(&ctx, &deployment).await {
                        result = Some(err.into());
                    }
                }
            }
        }

        let hwm = Arc::clone(&self.last_version);
        let version = connector.version;
        if let Err(register_err) = ctx
            .add_post_commit_action(move || {
                hwm.fetch_max(version, Ordering::AcqRel);
            })
            .await
        {
            tracing::error!(
                connector_id = %connector.id,
                version,
                error = %register_err,
                "failed to register post-commit version advance"
            );
            result = Some(match result.take() {
                None => register_err.into(),
                Some(first) => ReconcileError::Multiple {
                    connector_id: connector.id.clone(),
                    first: Box::new(first),
                    second: Box::new(register_err.into()),
                },
            });
        }

        match result {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
