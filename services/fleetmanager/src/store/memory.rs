//! In-memory implementation of the fleet-manager stores.
//!
//! # Purpose
//! Implements `ConnectorStore`, `ClusterStore`, and `CatalogStore` entirely in
//! memory using `HashMap`s guarded by `tokio::sync::RwLock`. It exists for:
//! - local development and tests (no external dependencies)
//! - single-replica deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all state is lost on process restart.
//! - **Single-process consistency**: mutations are serialized behind write
//!   locks. The transaction context passed into mutating methods is used for
//!   its lifecycle/post-commit semantics only; partial-failure rollback of
//!   state is a property of the durable backend.
//! - **No multi-replica coordination**: each process has independent state,
//!   so the cross-replica startup-gate probe is only meaningful on Postgres.
use super::{
    CatalogStore, ClusterStore, ConnectorPatch, ConnectorSelector, ConnectorStore, StoreError,
    StoreResult,
};
use crate::db::TxContext;
use crate::model::{
    CatalogKey, Connector, ConnectorPhase, ConnectorStatus, Deployment, DesiredState, Namespace,
    NamespacePhase, ShardMetadata,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shard-metadata rows with a process-local id sequence.
#[derive(Default)]
struct ShardMetadataTable {
    next_id: i64,
    rows: Vec<ShardMetadata>,
}

impl ShardMetadataTable {
    fn latest(&self, connector_type_id: &str, channel: &str) -> Option<&ShardMetadata> {
        self.rows
            .iter()
            .filter(|row| row.connector_type_id == connector_type_id && row.channel == channel)
            .max_by_key(|row| row.revision)
    }
}

/// In-memory fleet-manager store.
///
/// Deployments are keyed by `connector_id`, which also enforces the
/// at-most-one-deployment-per-connector invariant.
pub struct InMemoryStore {
    connectors: Arc<RwLock<HashMap<String, Connector>>>,
    namespaces: Arc<RwLock<HashMap<String, Namespace>>>,
    deployments: Arc<RwLock<HashMap<String, Deployment>>>,
    shard_metadata: Arc<RwLock<ShardMetadataTable>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            connectors: Arc::new(RwLock::new(HashMap::new())),
            namespaces: Arc::new(RwLock::new(HashMap::new())),
            deployments: Arc::new(RwLock::new(HashMap::new())),
            shard_metadata: Arc::new(RwLock::new(ShardMetadataTable::default())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(selector: &ConnectorSelector, connector: &Connector) -> bool {
    match selector {
        ConnectorSelector::DesiredAndPhase {
            desired,
            phase,
            namespace_required,
        } => {
            connector.desired_state == *desired
                && connector.status.phase == *phase
                && (!namespace_required || connector.namespace_id.is_some())
        }
        ConnectorSelector::DesiredAndPhaseIn { desired, phases } => {
            connector.desired_state == *desired && phases.contains(&connector.status.phase)
        }
        ConnectorSelector::VersionAbove {
            version,
            exclude_phases,
        } => connector.version > *version && !exclude_phases.contains(&connector.status.phase),
    }
}

#[async_trait]
impl ConnectorStore for InMemoryStore {
    async fn create(&self, connector: Connector) -> StoreResult<Connector> {
        let mut connectors = self.connectors.write().await;
        if connectors.contains_key(&connector.id) {
            return Err(StoreError::Conflict("connector exists".into()));
        }
        connectors.insert(connector.id.clone(), connector.clone());
        metrics::gauge!("fleet_connectors_total").set(connectors.len() as f64);
        Ok(connector)
    }

    async fn get(&self, id: &str) -> StoreResult<Connector> {
        self.connectors
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("connector".into()))
    }

    async fn list(&self) -> StoreResult<Vec<Connector>> {
        let mut items: Vec<_> = self.connectors.read().await.values().cloned().collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn update_definition(&self, id: &str, patch: ConnectorPatch) -> StoreResult<Connector> {
        let mut connectors = self.connectors.write().await;
        let connector = connectors
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound("connector".into()))?;
        if let Some(definition) = patch.definition {
            connector.definition = definition;
        }
        if let Some(channel) = patch.channel {
            connector.channel = channel;
        }
        if let Some(namespace_id) = patch.namespace_id {
            connector.namespace_id = Some(namespace_id);
        }
        connector.version += 1;
        Ok(connector.clone())
    }

    async fn set_desired_state(
        &self,
        id: &str,
        desired: DesiredState,
        phase: Option<ConnectorPhase>,
    ) -> StoreResult<()> {
        let mut connectors = self.connectors.write().await;
        let connector = connectors
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound("connector".into()))?;
        connector.desired_state = desired;
        if let Some(phase) = phase {
            connector.status.phase = phase;
        }
        Ok(())
    }

    async fn select(&self, selector: &ConnectorSelector) -> StoreResult<Vec<Connector>> {
        let mut items: Vec<_> = self
            .connectors
            .read()
            .await
            .values()
            .filter(|connector| matches(selector, connector))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn lock_row(&self, _ctx: &TxContext, id: &str) -> StoreResult<()> {
        // No row locks in memory; existence is all that can be checked.
        if self.connectors.read().await.contains_key(id) {
            Ok(())
        } else {
            Err(StoreError::NotFound("connector".into()))
        }
    }

    async fn save_status(&self, _ctx: &TxContext, status: ConnectorStatus) -> StoreResult<()> {
        let mut connectors = self.connectors.write().await;
        let connector = connectors
            .get_mut(&status.id)
            .ok_or_else(|| StoreError::NotFound("connector".into()))?;
        connector.status = status;
        Ok(())
    }

    async fn clear_namespace(&self, _ctx: &TxContext, id: &str) -> StoreResult<()> {
        let mut connectors = self.connectors.write().await;
        let connector = connectors
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound("connector".into()))?;
        connector.namespace_id = None;
        Ok(())
    }

    async fn delete(&self, _ctx: &TxContext, id: &str) -> StoreResult<()> {
        let mut connectors = self.connectors.write().await;
        if connectors.remove(id).is_none() {
            return Err(StoreError::NotFound("connector".into()));
        }
        metrics::gauge!("fleet_connectors_total").set(connectors.len() as f64);
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn create_namespace(&self, namespace: Namespace) -> StoreResult<Namespace> {
        let mut namespaces = self.namespaces.write().await;
        if namespaces.contains_key(&namespace.id) {
            return Err(StoreError::Conflict("namespace exists".into()));
        }
        namespaces.insert(namespace.id.clone(), namespace.clone());
        Ok(namespace)
    }

    async fn find_available_namespace(
        &self,
        owner: &str,
        organisation_id: &str,
        preferred_namespace_id: Option<&str>,
    ) -> StoreResult<Option<Namespace>> {
        let namespaces = self.namespaces.read().await;
        let mut candidates: Vec<_> = namespaces
            .values()
            .filter(|ns| ns.phase == NamespacePhase::Ready)
            .filter(|ns| ns.eligible_for(owner, organisation_id))
            .filter(|ns| preferred_namespace_id.is_none_or(|preferred| ns.id == preferred))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(candidates.into_iter().next())
    }

    async fn get_deployment_by_connector_id(
        &self,
        _ctx: &TxContext,
        connector_id: &str,
    ) -> StoreResult<Deployment> {
        self.deployments
            .read()
            .await
            .get(connector_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("deployment".into()))
    }

    async fn save_deployment(&self, _ctx: &TxContext, deployment: &Deployment) -> StoreResult<()> {
        self.deployments
            .write()
            .await
            .insert(deployment.connector_id.clone(), deployment.clone());
        Ok(())
    }

    async fn delete_deployment(&self, connector_id: &str) -> StoreResult<()> {
        if self
            .deployments
            .write()
            .await
            .remove(connector_id)
            .is_none()
        {
            return Err(StoreError::NotFound("deployment".into()));
        }
        Ok(())
    }

    async fn cleanup_deployments(&self) -> StoreResult<u64> {
        let connectors = self.connectors.read().await;
        let mut deployments = self.deployments.write().await;
        let before = deployments.len();
        deployments.retain(|connector_id, _| connectors.contains_key(connector_id));
        Ok((before - deployments.len()) as u64)
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn put_connector_shard_metadata(&self, metadata: ShardMetadata) -> StoreResult<i64> {
        let mut table = self.shard_metadata.write().await;
        if let Some(existing) = table.rows.iter_mut().find(|row| {
            row.connector_type_id == metadata.connector_type_id
                && row.channel == metadata.channel
                && row.revision == metadata.revision
        }) {
            existing.shard_metadata = metadata.shard_metadata;
            return Ok(existing.id);
        }
        table.next_id += 1;
        let id = table.next_id;
        table.rows.push(ShardMetadata { id, ..metadata });
        Ok(id)
    }

    async fn get_latest_connector_shard_metadata(
        &self,
        connector_type_id: &str,
        channel: &str,
    ) -> StoreResult<ShardMetadata> {
        self.shard_metadata
            .read()
            .await
            .latest(connector_type_id, channel)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("shard metadata".into()))
    }

    async fn delete_unused_and_not_in_catalog(
        &self,
        configured: &[CatalogKey],
    ) -> StoreResult<u64> {
        let connectors = self.connectors.read().await;
        let deployments = self.deployments.read().await;
        let mut table = self.shard_metadata.write().await;
        let before = table.rows.len();
        table.rows.retain(|row| {
            let in_catalog = configured.contains(&row.key());
            let referenced_by_connector = connectors.values().any(|c| {
                c.connector_type_id == row.connector_type_id && c.channel == row.channel
            });
            let referenced_by_deployment = deployments
                .values()
                .any(|d| d.connector_shard_metadata_id == row.id);
            in_catalog || referenced_by_connector || referenced_by_deployment
        });
        Ok((before - table.rows.len()) as u64)
    }

    async fn catalog_entries_reconciled(&self, desired: &[ShardMetadata]) -> StoreResult<bool> {
        let table = self.shard_metadata.read().await;
        for want in desired {
            match table.latest(&want.connector_type_id, &want.channel) {
                Some(have)
                    if have.revision == want.revision
                        && have.shard_metadata == want.shard_metadata => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}
