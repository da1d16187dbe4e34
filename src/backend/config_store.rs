//! The singleton tenancy config, stored under `config`.
//!
//! Every operation is a read-modify-write against storage performed while holding the
//! store's lock; the substrate is not assumed to make check-then-act atomic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::storage::{Storage, StorageEntry};

pub const CONFIG_KEY: &str = "config";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(rename = "homeTenancyId")]
    pub home_tenancy_id: String,
}

impl ConfigEntry {
    pub fn new(home_tenancy_id: impl Into<String>) -> Self { Self { home_tenancy_id: home_tenancy_id.into() } }

    pub fn validate(&self) -> AppResult<()> {
        if self.home_tenancy_id.trim().is_empty() {
            return Err(AppError::validation("missing_home_tenancy_id", "missing homeTenancyId"));
        }
        Ok(())
    }

    pub fn to_response(&self) -> serde_json::Value {
        serde_json::json!({ "homeTenancyId": self.home_tenancy_id })
    }
}

pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    lock: RwLock<()>,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self { Self { storage, lock: RwLock::new(()) } }

    async fn non_locked_get(&self) -> AppResult<Option<ConfigEntry>> {
        match self.storage.get(CONFIG_KEY).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    async fn non_locked_put(&self, cfg: &ConfigEntry) -> AppResult<()> {
        self.storage.put(StorageEntry::json(CONFIG_KEY, cfg)?).await?;
        Ok(())
    }

    pub async fn get(&self) -> AppResult<Option<ConfigEntry>> {
        let _r = self.lock.read().await;
        self.non_locked_get().await
    }

    async fn non_locked_create(&self, cfg: ConfigEntry) -> AppResult<ConfigEntry> {
        self.non_locked_put(&cfg).await?;
        info!(target: "ociauth::config", home_tenancy_id = %cfg.home_tenancy_id, "config created");
        Ok(cfg)
    }

    async fn non_locked_update(&self, mut current: ConfigEntry, cfg: ConfigEntry) -> AppResult<ConfigEntry> {
        current.home_tenancy_id = cfg.home_tenancy_id;
        self.non_locked_put(&current).await?;
        info!(target: "ociauth::config", home_tenancy_id = %current.home_tenancy_id, "config updated");
        Ok(current)
    }

    pub async fn create(&self, cfg: ConfigEntry) -> AppResult<ConfigEntry> {
        cfg.validate()?;
        let _w = self.lock.write().await;
        if self.non_locked_get().await?.is_some() {
            return Err(AppError::already_exists("config_exists", "the specified config already exists"));
        }
        self.non_locked_create(cfg).await
    }

    pub async fn update(&self, cfg: ConfigEntry) -> AppResult<ConfigEntry> {
        cfg.validate()?;
        let _w = self.lock.write().await;
        let Some(current) = self.non_locked_get().await? else {
            return Err(AppError::not_found("config_not_found", "the specified config does not exist"));
        };
        self.non_locked_update(current, cfg).await
    }

    /// Create when absent, update when present. The existence check and the put happen
    /// under one write lock.
    pub async fn write(&self, cfg: ConfigEntry) -> AppResult<ConfigEntry> {
        cfg.validate()?;
        let _w = self.lock.write().await;
        match self.non_locked_get().await? {
            Some(current) => self.non_locked_update(current, cfg).await,
            None => self.non_locked_create(cfg).await,
        }
    }

    /// Idempotent: deleting an absent config succeeds.
    pub async fn delete(&self) -> AppResult<()> {
        let _w = self.lock.write().await;
        self.storage.delete(CONFIG_KEY).await?;
        info!(target: "ociauth::config", "config deleted");
        Ok(())
    }
}
