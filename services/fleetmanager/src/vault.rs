//! Secret vault handle.
//!
//! # Purpose
//! Connector definitions can reference secrets that must never land in the
//! metadata store. The reconciler holds a vault handle for the passes that
//! resolve or clean up those secrets; the core lifecycle passes only carry
//! it through.
use crate::store::{StoreError, StoreResult};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait VaultService: Send + Sync {
    async fn get_secret(&self, name: &str) -> StoreResult<String>;
    async fn set_secret(&self, name: &str, value: &str, owning_resource: &str) -> StoreResult<()>;
    async fn delete_secret(&self, name: &str) -> StoreResult<()>;
}

/// Process-local vault for development and tests. Secrets are lost on
/// restart; production deployments use an external secret manager.
pub struct TmpVaultService {
    secrets: RwLock<HashMap<String, String>>,
}

impl TmpVaultService {
    pub fn new() -> Self {
        Self {
            secrets: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for TmpVaultService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VaultService for TmpVaultService {
    async fn get_secret(&self, name: &str) -> StoreResult<String> {
        self.secrets
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("secret".into()))
    }

    async fn set_secret(&self, name: &str, value: &str, owning_resource: &str) -> StoreResult<()> {
        if name.is_empty() {
            return Err(StoreError::Unexpected(anyhow!(
                "secret name must not be empty (owner {owning_resource})"
            )));
        }
        self.secrets
            .write()
            .await
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> StoreResult<()> {
        if self.secrets.write().await.remove(name).is_none() {
            return Err(StoreError::NotFound("secret".into()));
        }
        Ok(())
    }
}
