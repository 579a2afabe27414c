//! Fleet-manager configuration.
//!
//! # Purpose
//! Service configuration sourced from environment variables with an optional
//! YAML override file, plus the connector catalog loaded once at process
//! start from a directory of JSON files.
use crate::model::{CatalogKey, ShardMetadata};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

// Fleet-manager configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct FleetManagerConfig {
    // HTTP bind address for the fleet-manager API.
    pub bind_addr: SocketAddr,
    // Metrics HTTP bind address.
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    // Cadence of the connector reconcile loop.
    pub reconcile_interval_secs: u64,
    // Directory of connector catalog JSON files; empty catalog when unset.
    pub catalog_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct FleetManagerConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<String>,
    postgres_url: Option<String>,
    reconcile_interval_secs: Option<u64>,
    catalog_dir: Option<PathBuf>,
}

impl FleetManagerConfig {
    pub fn from_env() -> Result<Self> {
        // Environment variables provide defaults for local development.
        let bind_addr = std::env::var("FLEET_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8000".to_string())
            .parse()
            .with_context(|| "parse FLEET_BIND")?;
        let metrics_bind = std::env::var("FLEET_METRICS_BIND")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .with_context(|| "parse FLEET_METRICS_BIND")?;

        let postgres_url = std::env::var("FLEET_POSTGRES_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok();
        // Postgres is selected implicitly by providing a URL; FLEET_STORAGE
        // can force the memory backend for local runs.
        let storage = match std::env::var("FLEET_STORAGE").ok().as_deref() {
            Some("memory") => StorageBackend::Memory,
            Some("postgres") => StorageBackend::Postgres,
            Some(other) => bail!("unknown FLEET_STORAGE backend: {other}"),
            None if postgres_url.is_some() => StorageBackend::Postgres,
            None => StorageBackend::Memory,
        };
        let postgres = match (&storage, postgres_url) {
            (StorageBackend::Postgres, Some(url)) => Some(PostgresConfig {
                url,
                max_connections: env_parse("FLEET_PG_MAX_CONNECTIONS", 10)?,
                acquire_timeout_ms: env_parse("FLEET_PG_ACQUIRE_TIMEOUT_MS", 5_000)?,
            }),
            (StorageBackend::Postgres, None) => {
                bail!("FLEET_STORAGE=postgres requires FLEET_POSTGRES_URL or DATABASE_URL")
            }
            _ => None,
        };

        let reconcile_interval_secs = env_parse("FLEET_RECONCILE_INTERVAL_SECS", 15)?;
        let catalog_dir = std::env::var("FLEET_CATALOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            reconcile_interval_secs,
            catalog_dir,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("FLEET_CONFIG") {
            // YAML overrides allow ops-friendly config files.
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read FLEET_CONFIG: {path}"))?;
            let override_cfg: FleetManagerConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse fleet manager config yaml")?;
            if let Some(value) = override_cfg.bind_addr {
                config.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
            }
            if let Some(value) = override_cfg.metrics_bind {
                config.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
            }
            if let Some(value) = override_cfg.storage {
                config.storage = match value.as_str() {
                    "memory" => StorageBackend::Memory,
                    "postgres" => StorageBackend::Postgres,
                    other => bail!("unknown storage backend in config yaml: {other}"),
                };
            }
            if let Some(url) = override_cfg.postgres_url {
                let postgres = config.postgres.get_or_insert(PostgresConfig {
                    url: String::new(),
                    max_connections: 10,
                    acquire_timeout_ms: 5_000,
                });
                postgres.url = url;
            }
            if let Some(value) = override_cfg.reconcile_interval_secs {
                config.reconcile_interval_secs = value;
            }
            if let Some(value) = override_cfg.catalog_dir {
                config.catalog_dir = Some(value);
            }
        }
        if config.storage == StorageBackend::Postgres && config.postgres.is_none() {
            bail!("postgres storage selected without a postgres url");
        }
        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

/// Per-channel configuration of a connector type, as shipped in the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub shard_metadata: serde_json::Value,
}

/// One configured `(connector type, channel)` catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub connector_type_id: String,
    pub channel: String,
    pub channel_config: ChannelConfig,
}

// One catalog file declares a connector type and its release channels.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    connector_type_id: String,
    channels: BTreeMap<String, ChannelConfig>,
}

/// The connector catalog as configured for this process.
///
/// Loaded once at startup; the startup reconcile pushes it into the catalog
/// store, and the startup-gate probe compares the store against it.
#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    entries: Vec<CatalogEntry>,
}

impl CatalogConfig {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// Read every `*.json` catalog file under `dir`.
    ///
    /// Duplicate `(connector type, channel)` pairs across files are a
    /// configuration error; loading failures are fatal to startup.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut paths = Vec::new();
        for entry in
            fs::read_dir(dir).with_context(|| format!("read catalog dir {}", dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut entries = Vec::new();
        let mut seen = HashSet::new();
        for path in paths {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read catalog file {}", path.display()))?;
            let file: CatalogFile = serde_json::from_str(&contents)
                .with_context(|| format!("parse catalog file {}", path.display()))?;
            for (channel, channel_config) in file.channels {
                if !seen.insert((file.connector_type_id.clone(), channel.clone())) {
                    bail!(
                        "duplicate catalog entry for connector type {} channel {channel}",
                        file.connector_type_id
                    );
                }
                entries.push(CatalogEntry {
                    connector_type_id: file.connector_type_id.clone(),
                    channel,
                    channel_config,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<CatalogKey> {
        self.entries
            .iter()
            .map(|entry| CatalogKey {
                connector_type_id: entry.connector_type_id.clone(),
                channel: entry.channel.clone(),
            })
            .collect()
    }

    /// The shard-metadata rows this catalog should resolve to, used both by
    /// the startup reconcile and by the cross-replica gate probe.
    pub fn desired_shard_metadata(&self) -> Result<Vec<ShardMetadata>, crate::reconcile::ReconcileError> {
        self.entries
            .iter()
            .map(crate::reconcile::shard_metadata_from_entry)
            .collect()
    }
}
