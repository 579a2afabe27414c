//! Store traits and shared error types.
//!
//! # Purpose
//! The reconciler and the HTTP API consume durable state through these
//! narrow traits. Two backends exist: Postgres (durable, shared across
//! replicas) and in-memory (dev/tests, single process).
use crate::db::TxContext;
use crate::model::{
    CatalogKey, Connector, ConnectorPhase, ConnectorStatus, Deployment, DesiredState, Namespace,
    ShardMetadata,
};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Row predicate for connector scans.
///
/// Each reconcile pass selects a different slice of the connector table; the
/// Postgres backend maps these to WHERE clauses, the memory backend to
/// filters. Scan order is backend-defined.
#[derive(Debug, Clone)]
pub enum ConnectorSelector {
    /// `desired_state = desired AND phase = phase`, optionally requiring a
    /// non-null preferred namespace on the connector row.
    DesiredAndPhase {
        desired: DesiredState,
        phase: ConnectorPhase,
        namespace_required: bool,
    },
    /// `desired_state = desired AND phase IN phases`.
    DesiredAndPhaseIn {
        desired: DesiredState,
        phases: Vec<ConnectorPhase>,
    },
    /// `version > version AND phase NOT IN exclude_phases`.
    VersionAbove {
        version: i64,
        exclude_phases: Vec<ConnectorPhase>,
    },
}

/// Fields a user edit may change. Every applied edit bumps `version`.
#[derive(Debug, Clone, Default)]
pub struct ConnectorPatch {
    pub definition: Option<serde_json::Value>,
    pub channel: Option<String>,
    /// New preferred namespace; placement requires one to be set.
    pub namespace_id: Option<String>,
}

#[async_trait]
pub trait ConnectorStore: Send + Sync {
    async fn create(&self, connector: Connector) -> StoreResult<Connector>;
    async fn get(&self, id: &str) -> StoreResult<Connector>;
    async fn list(&self) -> StoreResult<Vec<Connector>>;
    /// Apply a user edit and bump the connector version.
    async fn update_definition(&self, id: &str, patch: ConnectorPatch) -> StoreResult<Connector>;
    /// Record an external intent flip, optionally forcing the phase with it
    /// (deletion intent moves assigned connectors straight to `deleting`).
    async fn set_desired_state(
        &self,
        id: &str,
        desired: DesiredState,
        phase: Option<ConnectorPhase>,
    ) -> StoreResult<()>;

    /// Scan rows matching `selector`. Runs outside any transaction context;
    /// callers open their own per-row transactions afterwards.
    async fn select(&self, selector: &ConnectorSelector) -> StoreResult<Vec<Connector>>;
    /// Take a row-level lock on the connector inside the open transaction,
    /// so concurrent replicas cannot race the same transition.
    async fn lock_row(&self, ctx: &TxContext, id: &str) -> StoreResult<()>;
    async fn save_status(&self, ctx: &TxContext, status: ConnectorStatus) -> StoreResult<()>;
    /// Clear the preferred `namespace_id` on the connector row.
    async fn clear_namespace(&self, ctx: &TxContext, id: &str) -> StoreResult<()>;
    /// Hard-delete the connector row, cascading to its status row.
    async fn delete(&self, ctx: &TxContext, id: &str) -> StoreResult<()>;

    async fn health_check(&self) -> StoreResult<()>;
    fn backend_name(&self) -> &'static str;
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn create_namespace(&self, namespace: Namespace) -> StoreResult<Namespace>;
    /// Pick a ready namespace eligible for `(owner, organisation)`, honouring
    /// a preferred namespace id when given. `None` means no capacity now.
    async fn find_available_namespace(
        &self,
        owner: &str,
        organisation_id: &str,
        preferred_namespace_id: Option<&str>,
    ) -> StoreResult<Option<Namespace>>;

    /// `NotFound` is a meaningful outcome here: the deleting pass treats it
    /// as "cluster agent finished tearing the deployment down".
    async fn get_deployment_by_connector_id(
        &self,
        ctx: &TxContext,
        connector_id: &str,
    ) -> StoreResult<Deployment>;
    async fn save_deployment(&self, ctx: &TxContext, deployment: &Deployment) -> StoreResult<()>;
    /// Remove a deployment outside any reconcile transaction. Invoked on
    /// behalf of the cluster agent when teardown completes.
    async fn delete_deployment(&self, connector_id: &str) -> StoreResult<()>;
    /// Best-effort prune of deployments whose connector no longer exists
    /// (left behind by prior crashed starts).
    async fn cleanup_deployments(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Idempotent upsert keyed by `(connector_type_id, channel, revision)`.
    /// Returns the stored row id.
    async fn put_connector_shard_metadata(&self, metadata: ShardMetadata) -> StoreResult<i64>;
    async fn get_latest_connector_shard_metadata(
        &self,
        connector_type_id: &str,
        channel: &str,
    ) -> StoreResult<ShardMetadata>;
    /// Delete rows whose key is absent from `configured` and which no
    /// connector or deployment still references. Returns rows removed.
    async fn delete_unused_and_not_in_catalog(
        &self,
        configured: &[CatalogKey],
    ) -> StoreResult<u64>;
    /// True when every desired entry is already stored with the same revision
    /// and payload, meaning some replica has finished catalog reconciliation.
    async fn catalog_entries_reconciled(&self, desired: &[ShardMetadata]) -> StoreResult<bool>;
}
