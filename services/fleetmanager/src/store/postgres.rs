//! Postgres-backed implementation of the fleet-manager stores.
//!
//! # What this module is
//! Implements `ConnectorStore`, `ClusterStore`, and `CatalogStore` using
//! Postgres (via `sqlx`) as the durable, shared backing store for fleet
//! metadata: connector requests, their status rows, namespaces, shard
//! metadata revisions, and deployments.
//!
//! # Reconciler integration
//! Scan queries (`select`) run against the pool. Per-row mutations
//! (`save_status`, `save_deployment`, `delete`, ...) take a transaction
//! context and execute on the transaction the reconciler opened for that row,
//! so a failed transition rolls back every write it made. `lock_row` takes a
//! `SELECT ... FOR UPDATE` row lock so two replicas cannot race the same
//! connector.
//!
//! # Consistency
//! - `connector_statuses` cascades from `connectors`, so hard deletion is one
//!   statement.
//! - `connector_deployments.connector_id` is UNIQUE, enforcing at most one
//!   deployment per connector.
//! - Shard metadata is append-only per `(type, channel, revision)`; "latest"
//!   means highest revision. The upsert is idempotent under concurrent
//!   startup reconciles.
//!
//! # Operational notes
//! - Migrations run at connect time via `sqlx::migrate!("./migrations")`.
//! - Pool timeouts are configured explicitly; a control-plane service must
//!   fail fast rather than hang when the database is unhealthy.
use super::{
    CatalogStore, ClusterStore, ConnectorPatch, ConnectorSelector, ConnectorStore, StoreError,
    StoreResult,
};
use crate::config::PostgresConfig;
use crate::db::TxContext;
use crate::model::{
    CatalogKey, Connector, ConnectorPhase, ConnectorStatus, Deployment, DesiredState, Namespace,
    NamespacePhase, ShardMetadata,
};
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use std::time::Duration;

/// Durable fleet-manager store backed by Postgres.
///
/// Safe to share across the reconciler and request handlers; `sqlx` leases
/// pooled connections per statement, while reconcile transactions pin one
/// connection through their `TxContext`.
pub struct PostgresStore {
    pool: PgPool,
}

const CONNECTOR_COLUMNS: &str = "c.id, c.owner, c.organisation_id, c.connector_type_id, \
     c.channel, c.desired_state, c.namespace_id, c.version, c.definition, \
     s.namespace_id AS status_namespace_id, s.phase";

/// Row shape for the joined `connectors` + `connector_statuses` queries.
///
/// DB-facing structs stay separate from the domain types so column naming and
/// string-enum parsing stay localized here.
#[derive(Debug, Clone, FromRow)]
struct DbConnector {
    id: String,
    owner: String,
    organisation_id: String,
    connector_type_id: String,
    channel: String,
    desired_state: String,
    namespace_id: Option<String>,
    version: i64,
    definition: Value,
    status_namespace_id: Option<String>,
    phase: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbNamespace {
    id: String,
    cluster_id: String,
    tenant_owner: Option<String>,
    tenant_organisation: Option<String>,
    phase: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbDeployment {
    id: String,
    connector_id: String,
    cluster_id: String,
    namespace_id: String,
    connector_version: i64,
    connector_shard_metadata_id: i64,
    status: String,
}

#[derive(Debug, Clone, FromRow)]
struct DbShardMetadata {
    id: i64,
    connector_type_id: String,
    channel: String,
    revision: i64,
    shard_metadata: Value,
}

impl PostgresStore {
    /// Connect to Postgres and run migrations before anything is served.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        let connect_options =
            PgConnectOptions::from_str(&pg.url).map_err(|e| StoreError::Unexpected(e.into()))?;
        let pool = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn refresh_counts(&self) -> StoreResult<()> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connectors")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        metrics::gauge!("fleet_connectors_total").set(total as f64);
        Ok(())
    }
}

#[async_trait]
impl ConnectorStore for PostgresStore {
    /// Insert the connector row and its status row in one transaction.
    async fn create(&self, connector: Connector) -> StoreResult<Connector> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;

        let insert = sqlx::query(
            r#"INSERT INTO connectors
               (id, owner, organisation_id, connector_type_id, channel, desired_state, namespace_id, version, definition)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"#,
        )
        .bind(&connector.id)
        .bind(&connector.owner)
        .bind(&connector.organisation_id)
        .bind(&connector.connector_type_id)
        .bind(&connector.channel)
        .bind(desired_state_to_str(&connector.desired_state))
        .bind(&connector.namespace_id)
        .bind(connector.version)
        .bind(&connector.definition)
        .execute(&mut *tx)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("connector exists".into()));
            }
            return Err(StoreError::Unexpected(err.into()));
        }

        sqlx::query(
            r#"INSERT INTO connector_statuses (id, namespace_id, phase) VALUES ($1, $2, $3)"#,
        )
        .bind(&connector.status.id)
        .bind(&connector.status.namespace_id)
        .bind(phase_to_str(&connector.status.phase))
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        self.refresh_counts().await?;
        Ok(connector)
    }

    async fn get(&self, id: &str) -> StoreResult<Connector> {
        let sql = format!(
            "SELECT {CONNECTOR_COLUMNS} FROM connectors c \
             JOIN connector_statuses s ON s.id = c.id WHERE c.id = $1"
        );
        let row = sqlx::query_as::<_, DbConnector>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        match row {
            Some(row) => connector_from_db(row),
            None => Err(StoreError::NotFound("connector".into())),
        }
    }

    async fn list(&self) -> StoreResult<Vec<Connector>> {
        let sql = format!(
            "SELECT {CONNECTOR_COLUMNS} FROM connectors c \
             JOIN connector_statuses s ON s.id = c.id ORDER BY c.id"
        );
        let rows = sqlx::query_as::<_, DbConnector>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        rows.into_iter().map(connector_from_db).collect()
    }

    /// Read-modify-write under a row lock; every applied edit bumps `version`.
    async fn update_definition(&self, id: &str, patch: ConnectorPatch) -> StoreResult<Connector> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;

        let sql = format!(
            "SELECT {CONNECTOR_COLUMNS} FROM connectors c \
             JOIN connector_statuses s ON s.id = c.id WHERE c.id = $1 FOR UPDATE OF c"
        );
        let current = sqlx::query_as::<_, DbConnector>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        let mut updated = match current {
            Some(row) => connector_from_db(row)?,
            None => return Err(StoreError::NotFound("connector".into())),
        };

        if let Some(definition) = patch.definition {
            updated.definition = definition;
        }
        if let Some(channel) = patch.channel {
            updated.channel = channel;
        }
        if let Some(namespace_id) = patch.namespace_id {
            updated.namespace_id = Some(namespace_id);
        }
        updated.version += 1;

        sqlx::query(
            r#"UPDATE connectors
               SET definition = $1, channel = $2, namespace_id = $3, version = $4, updated_at = now()
               WHERE id = $5"#,
        )
        .bind(&updated.definition)
        .bind(&updated.channel)
        .bind(&updated.namespace_id)
        .bind(updated.version)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(updated)
    }

    async fn set_desired_state(
        &self,
        id: &str,
        desired: DesiredState,
        phase: Option<ConnectorPhase>,
    ) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;

        let updated =
            sqlx::query("UPDATE connectors SET desired_state = $1, updated_at = now() WHERE id = $2")
                .bind(desired_state_to_str(&desired))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Unexpected(e.into()))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound("connector".into()));
        }

        if let Some(phase) = phase {
            sqlx::query(
                "UPDATE connector_statuses SET phase = $1, updated_at = now() WHERE id = $2",
            )
            .bind(phase_to_str(&phase))
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(())
    }

    async fn select(&self, selector: &ConnectorSelector) -> StoreResult<Vec<Connector>> {
        let base = format!(
            "SELECT {CONNECTOR_COLUMNS} FROM connectors c JOIN connector_statuses s ON s.id = c.id"
        );
        let rows = match selector {
            ConnectorSelector::DesiredAndPhase {
                desired,
                phase,
                namespace_required,
            } => {
                let namespace_clause = if *namespace_required {
                    " AND c.namespace_id IS NOT NULL"
                } else {
                    ""
                };
                let sql = format!(
                    "{base} WHERE c.desired_state = $1 AND s.phase = $2{namespace_clause} ORDER BY c.id"
                );
                sqlx::query_as::<_, DbConnector>(&sql)
                    .bind(desired_state_to_str(desired))
                    .bind(phase_to_str(phase))
                    .fetch_all(&self.pool)
                    .await
            }
            ConnectorSelector::DesiredAndPhaseIn { desired, phases } => {
                let sql =
                    format!("{base} WHERE c.desired_state = $1 AND s.phase = ANY($2) ORDER BY c.id");
                sqlx::query_as::<_, DbConnector>(&sql)
                    .bind(desired_state_to_str(desired))
                    .bind(phases.iter().map(phase_to_str_owned).collect::<Vec<_>>())
                    .fetch_all(&self.pool)
                    .await
            }
            ConnectorSelector::VersionAbove {
                version,
                exclude_phases,
            } => {
                let sql = format!("{base} WHERE c.version > $1 AND s.phase <> ALL($2) ORDER BY c.id");
                sqlx::query_as::<_, DbConnector>(&sql)
                    .bind(version)
                    .bind(
                        exclude_phases
                            .iter()
                            .map(phase_to_str_owned)
                            .collect::<Vec<_>>(),
                    )
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Unexpected(e.into()))?;

        rows.into_iter().map(connector_from_db).collect()
    }

    async fn lock_row(&self, ctx: &TxContext, id: &str) -> StoreResult<()> {
        let mut state = ctx.lock_state().await;
        let conn = state.pg_conn()?;
        let row: Option<String> =
            sqlx::query_scalar("SELECT id FROM connectors WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(conn)
                .await
                .map_err(|e| StoreError::Unexpected(e.into()))?;
        match row {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound("connector".into())),
        }
    }

    async fn save_status(&self, ctx: &TxContext, status: ConnectorStatus) -> StoreResult<()> {
        let mut state = ctx.lock_state().await;
        let conn = state.pg_conn()?;
        sqlx::query(
            r#"INSERT INTO connector_statuses (id, namespace_id, phase) VALUES ($1, $2, $3)
               ON CONFLICT (id) DO UPDATE
               SET namespace_id = EXCLUDED.namespace_id, phase = EXCLUDED.phase, updated_at = now()"#,
        )
        .bind(&status.id)
        .bind(&status.namespace_id)
        .bind(phase_to_str(&status.phase))
        .execute(conn)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(())
    }

    async fn clear_namespace(&self, ctx: &TxContext, id: &str) -> StoreResult<()> {
        let mut state = ctx.lock_state().await;
        let conn = state.pg_conn()?;
        sqlx::query("UPDATE connectors SET namespace_id = NULL, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(())
    }

    async fn delete(&self, ctx: &TxContext, id: &str) -> StoreResult<()> {
        let removed = {
            let mut state = ctx.lock_state().await;
            let conn = state.pg_conn()?;
            sqlx::query("DELETE FROM connectors WHERE id = $1")
                .bind(id)
                .execute(conn)
                .await
                .map_err(|e| StoreError::Unexpected(e.into()))?
        };
        if removed.rows_affected() == 0 {
            return Err(StoreError::NotFound("connector".into()));
        }
        Ok(())
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl ClusterStore for PostgresStore {
    async fn create_namespace(&self, namespace: Namespace) -> StoreResult<Namespace> {
        let insert = sqlx::query(
            r#"INSERT INTO connector_namespaces (id, cluster_id, tenant_owner, tenant_organisation, phase)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(&namespace.id)
        .bind(&namespace.cluster_id)
        .bind(&namespace.tenant_owner)
        .bind(&namespace.tenant_organisation)
        .bind(namespace_phase_to_str(&namespace.phase))
        .execute(&self.pool)
        .await;
        if let Err(err) = insert {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict("namespace exists".into()));
            }
            return Err(StoreError::Unexpected(err.into()));
        }
        Ok(namespace)
    }

    async fn find_available_namespace(
        &self,
        owner: &str,
        organisation_id: &str,
        preferred_namespace_id: Option<&str>,
    ) -> StoreResult<Option<Namespace>> {
        let row = sqlx::query_as::<_, DbNamespace>(
            r#"SELECT id, cluster_id, tenant_owner, tenant_organisation, phase
               FROM connector_namespaces
               WHERE phase = 'ready'
                 AND ($3::text IS NULL OR id = $3)
                 AND (tenant_owner = $1 OR tenant_organisation = $2)
               ORDER BY id
               LIMIT 1"#,
        )
        .bind(owner)
        .bind(organisation_id)
        .bind(preferred_namespace_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        row.map(namespace_from_db).transpose()
    }

    async fn get_deployment_by_connector_id(
        &self,
        ctx: &TxContext,
        connector_id: &str,
    ) -> StoreResult<Deployment> {
        let mut state = ctx.lock_state().await;
        let conn = state.pg_conn()?;
        let row = sqlx::query_as::<_, DbDeployment>(
            r#"SELECT id, connector_id, cluster_id, namespace_id, connector_version,
                      connector_shard_metadata_id, status
               FROM connector_deployments WHERE connector_id = $1"#,
        )
        .bind(connector_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        match row {
            Some(row) => Ok(deployment_from_db(row)),
            None => Err(StoreError::NotFound("deployment".into())),
        }
    }

    async fn save_deployment(&self, ctx: &TxContext, deployment: &Deployment) -> StoreResult<()> {
        let mut state = ctx.lock_state().await;
        let conn = state.pg_conn()?;
        let saved = sqlx::query(
            r#"INSERT INTO connector_deployments
               (id, connector_id, cluster_id, namespace_id, connector_version, connector_shard_metadata_id, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               ON CONFLICT (id) DO UPDATE
               SET connector_version = EXCLUDED.connector_version, status = EXCLUDED.status"#,
        )
        .bind(&deployment.id)
        .bind(&deployment.connector_id)
        .bind(&deployment.cluster_id)
        .bind(&deployment.namespace_id)
        .bind(deployment.connector_version)
        .bind(deployment.connector_shard_metadata_id)
        .bind(&deployment.status)
        .execute(conn)
        .await;
        if let Err(err) = saved {
            if is_unique_violation(&err) {
                return Err(StoreError::Conflict(
                    "connector already has a deployment".into(),
                ));
            }
            return Err(StoreError::Unexpected(err.into()));
        }
        Ok(())
    }

    async fn delete_deployment(&self, connector_id: &str) -> StoreResult<()> {
        let removed = sqlx::query("DELETE FROM connector_deployments WHERE connector_id = $1")
            .bind(connector_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
        if removed.rows_affected() == 0 {
            return Err(StoreError::NotFound("deployment".into()));
        }
        Ok(())
    }

    async fn cleanup_deployments(&self) -> StoreResult<u64> {
        let removed = sqlx::query(
            r#"DELETE FROM connector_deployments d
               WHERE NOT EXISTS (SELECT 1 FROM connectors c WHERE c.id = d.connector_id)"#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(removed.rows_affected())
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    async fn put_connector_shard_metadata(&self, metadata: ShardMetadata) -> StoreResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"INSERT INTO connector_shard_metadata (connector_type_id, channel, revision, shard_metadata)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (connector_type_id, channel, revision)
               DO UPDATE SET shard_metadata = EXCLUDED.shard_metadata
               RETURNING id"#,
        )
        .bind(&metadata.connector_type_id)
        .bind(&metadata.channel)
        .bind(metadata.revision)
        .bind(&metadata.shard_metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(id)
    }

    async fn get_latest_connector_shard_metadata(
        &self,
        connector_type_id: &str,
        channel: &str,
    ) -> StoreResult<ShardMetadata> {
        let row = sqlx::query_as::<_, DbShardMetadata>(
            r#"SELECT id, connector_type_id, channel, revision, shard_metadata
               FROM connector_shard_metadata
               WHERE connector_type_id = $1 AND channel = $2
               ORDER BY revision DESC
               LIMIT 1"#,
        )
        .bind(connector_type_id)
        .bind(channel)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        match row {
            Some(row) => Ok(shard_metadata_from_db(row)),
            None => Err(StoreError::NotFound("shard metadata".into())),
        }
    }

    async fn delete_unused_and_not_in_catalog(
        &self,
        configured: &[CatalogKey],
    ) -> StoreResult<u64> {
        let type_ids: Vec<String> = configured
            .iter()
            .map(|key| key.connector_type_id.clone())
            .collect();
        let channels: Vec<String> = configured.iter().map(|key| key.channel.clone()).collect();
        let removed = sqlx::query(
            r#"DELETE FROM connector_shard_metadata m
               WHERE NOT EXISTS (
                   SELECT 1 FROM unnest($1::text[], $2::text[]) AS cfg(connector_type_id, channel)
                   WHERE cfg.connector_type_id = m.connector_type_id AND cfg.channel = m.channel
               )
               AND NOT EXISTS (
                   SELECT 1 FROM connectors c
                   WHERE c.connector_type_id = m.connector_type_id AND c.channel = m.channel
               )
               AND NOT EXISTS (
                   SELECT 1 FROM connector_deployments d
                   WHERE d.connector_shard_metadata_id = m.id
               )"#,
        )
        .bind(&type_ids)
        .bind(&channels)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Unexpected(e.into()))?;
        Ok(removed.rows_affected())
    }

    async fn catalog_entries_reconciled(&self, desired: &[ShardMetadata]) -> StoreResult<bool> {
        for want in desired {
            let have = sqlx::query_as::<_, DbShardMetadata>(
                r#"SELECT id, connector_type_id, channel, revision, shard_metadata
                   FROM connector_shard_metadata
                   WHERE connector_type_id = $1 AND channel = $2
                   ORDER BY revision DESC
                   LIMIT 1"#,
            )
            .bind(&want.connector_type_id)
            .bind(&want.channel)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Unexpected(e.into()))?;
            match have {
                Some(have)
                    if have.revision == want.revision
                        && have.shard_metadata == want.shard_metadata => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err.code().map(|code| code == "23505").unwrap_or(false);
    }
    false
}

fn connector_from_db(row: DbConnector) -> StoreResult<Connector> {
    Ok(Connector {
        status: ConnectorStatus {
            id: row.id.clone(),
            namespace_id: row.status_namespace_id,
            phase: parse_phase(&row.phase)?,
        },
        id: row.id,
        owner: row.owner,
        organisation_id: row.organisation_id,
        connector_type_id: row.connector_type_id,
        channel: row.channel,
        desired_state: parse_desired_state(&row.desired_state)?,
        namespace_id: row.namespace_id,
        version: row.version,
        definition: row.definition,
    })
}

fn namespace_from_db(row: DbNamespace) -> StoreResult<Namespace> {
    Ok(Namespace {
        id: row.id,
        cluster_id: row.cluster_id,
        tenant_owner: row.tenant_owner,
        tenant_organisation: row.tenant_organisation,
        phase: parse_namespace_phase(&row.phase)?,
    })
}

fn deployment_from_db(row: DbDeployment) -> Deployment {
    Deployment {
        id: row.id,
        connector_id: row.connector_id,
        cluster_id: row.cluster_id,
        namespace_id: row.namespace_id,
        connector_version: row.connector_version,
        connector_shard_metadata_id: row.connector_shard_metadata_id,
        status: row.status,
    }
}

fn shard_metadata_from_db(row: DbShardMetadata) -> ShardMetadata {
    ShardMetadata {
        id: row.id,
        connector_type_id: row.connector_type_id,
        channel: row.channel,
        revision: row.revision,
        shard_metadata: row.shard_metadata,
    }
}

fn parse_desired_state(value: &str) -> StoreResult<DesiredState> {
    match value {
        "ready" => Ok(DesiredState::Ready),
        "unassigned" => Ok(DesiredState::Unassigned),
        "deleted" => Ok(DesiredState::Deleted),
        _ => Err(StoreError::Unexpected(anyhow!(
            "invalid desired state {value}"
        ))),
    }
}

fn desired_state_to_str(value: &DesiredState) -> &'static str {
    match value {
        DesiredState::Ready => "ready",
        DesiredState::Unassigned => "unassigned",
        DesiredState::Deleted => "deleted",
    }
}

fn parse_phase(value: &str) -> StoreResult<ConnectorPhase> {
    match value {
        "assigning" => Ok(ConnectorPhase::Assigning),
        "assigned" => Ok(ConnectorPhase::Assigned),
        "deleting" => Ok(ConnectorPhase::Deleting),
        "deleted" => Ok(ConnectorPhase::Deleted),
        _ => Err(StoreError::Unexpected(anyhow!(
            "invalid connector phase {value}"
        ))),
    }
}

fn phase_to_str(value: &ConnectorPhase) -> &'static str {
    match value {
        ConnectorPhase::Assigning => "assigning",
        ConnectorPhase::Assigned => "assigned",
        ConnectorPhase::Deleting => "deleting",
        ConnectorPhase::Deleted => "deleted",
    }
}

fn phase_to_str_owned(value: &ConnectorPhase) -> String {
    phase_to_str(value).to_string()
}

fn parse_namespace_phase(value: &str) -> StoreResult<NamespacePhase> {
    match value {
        "provisioning" => Ok(NamespacePhase::Provisioning),
        "ready" => Ok(NamespacePhase::Ready),
        "deleting" => Ok(NamespacePhase::Deleting),
        _ => Err(StoreError::Unexpected(anyhow!(
            "invalid namespace phase {value}"
        ))),
    }
}

fn namespace_phase_to_str(value: &NamespacePhase) -> &'static str {
    match value {
        NamespacePhase::Provisioning => "provisioning",
        NamespacePhase::Ready => "ready",
        NamespacePhase::Deleting => "deleting",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_detects_only_db_codes() {
        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }

    #[test]
    fn desired_state_round_trip() {
        for state in [
            DesiredState::Ready,
            DesiredState::Unassigned,
            DesiredState::Deleted,
        ] {
            let text = desired_state_to_str(&state);
            assert_eq!(parse_desired_state(text).unwrap(), state);
        }
        assert!(parse_desired_state("unknown").is_err());
    }

    #[test]
    fn phase_round_trip() {
        for phase in [
            ConnectorPhase::Assigning,
            ConnectorPhase::Assigned,
            ConnectorPhase::Deleting,
            ConnectorPhase::Deleted,
        ] {
            let text = phase_to_str(&phase);
            assert_eq!(parse_phase(text).unwrap(), phase);
        }
        assert!(parse_phase("unknown").is_err());
    }

    #[test]
    fn namespace_phase_round_trip() {
        for phase in [
            NamespacePhase::Provisioning,
            NamespacePhase::Ready,
            NamespacePhase::Deleting,
        ] {
            let text = namespace_phase_to_str(&phase);
            assert_eq!(parse_namespace_phase(text).unwrap(), phase);
        }
        assert!(parse_namespace_phase("unknown").is_err());
    }

    #[test]
    fn connector_from_db_maps_fields() {
        let row = DbConnector {
            id: "c1".to_string(),
            owner: "alice".to_string(),
            organisation_id: "org-1".to_string(),
            connector_type_id: "debezium".to_string(),
            channel: "stable".to_string(),
            desired_state: "ready".to_string(),
            namespace_id: Some("ns-1".to_string()),
            version: 7,
            definition: serde_json::json!({"topic": "orders"}),
            status_namespace_id: Some("ns-1".to_string()),
            phase: "assigned".to_string(),
        };
        let connector = connector_from_db(row).expect("connector");
        assert_eq!(connector.id, "c1");
        assert_eq!(connector.version, 7);
        assert_eq!(connector.desired_state, DesiredState::Ready);
        assert_eq!(connector.status.phase, ConnectorPhase::Assigned);
        assert_eq!(connector.status.namespace_id.as_deref(), Some("ns-1"));
    }
}
