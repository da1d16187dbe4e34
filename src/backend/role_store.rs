//! Named roles under `role/<name>`: an allow-list of group ids plus token parameters.
//!
//! One reader/writer lock covers every role. Two unrelated role writes serialize
//! against each other; role administration is rare enough that this is fine.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::token_params::{StringList, TokenFieldsInput, TokenParams};
use crate::error::{AppError, AppResult};
use crate::storage::{Storage, StorageEntry};

pub const ROLE_PREFIX: &str = "role/";

/// The membership filter call is not paginated; larger lists risk truncation there.
pub const MAX_GROUP_IDS_PER_ROLE: usize = 100;

static ROLE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w(([\w\-.]+)?\w)?$").unwrap_or_else(|e| panic!("role name regex: {e}"))
});

/// Lowercase and check against the generic name pattern.
pub fn normalize_role_name(name: &str) -> AppResult<String> {
    let n = name.trim().to_lowercase();
    if n.is_empty() {
        return Err(AppError::validation("missing_role_name", "missing role name"));
    }
    if !ROLE_NAME_RE.is_match(&n) {
        return Err(AppError::validation("invalid_role_name".to_string(), format!("invalid role name '{}'", name)));
    }
    Ok(n)
}

fn role_key(name: &str) -> String { format!("{}{}", ROLE_PREFIX, name) }

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub role: String,
    #[serde(default, alias = "ocid_list")]
    pub allowed_group_ids: Vec<String>,
    #[serde(flatten)]
    pub token_params: TokenParams,
}

impl RoleEntry {
    pub fn new(name: impl Into<String>) -> Self { Self { role: name.into(), ..Default::default() } }

    pub fn to_response(&self) -> serde_json::Value {
        let mut data = serde_json::Map::new();
        data.insert("role".into(), serde_json::json!(self.role));
        data.insert("allowedGroupIds".into(), serde_json::json!(self.allowed_group_ids));
        self.token_params.populate_response(&mut data);
        serde_json::Value::Object(data)
    }
}

/// Fields an administrative write may carry. Everything is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleUpdate {
    #[serde(default, rename = "allowedGroupIds", alias = "ocid_list", alias = "allowed_group_ids")]
    pub allowed_group_ids: Option<StringList>,
    #[serde(flatten)]
    pub token: TokenFieldsInput,
}

impl RoleUpdate {
    pub fn with_groups<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_group_ids = Some(StringList::List(ids.into_iter().map(Into::into).collect()));
        self
    }
}

pub struct RoleStore {
    storage: Arc<dyn Storage>,
    lock: RwLock<()>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self { Self { storage, lock: RwLock::new(()) } }

    async fn non_locked_get(&self, name: &str) -> AppResult<Option<RoleEntry>> {
        match self.storage.get(&role_key(name)).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    pub async fn get(&self, name: &str) -> AppResult<Option<RoleEntry>> {
        let name = normalize_role_name(name)?;
        let _r = self.lock.read().await;
        self.non_locked_get(&name).await
    }

    /// Create (`is_create` and absent) or update (present) a role. Updating a missing
    /// role fails with NotFound. Nothing is persisted when validation fails.
    pub async fn create_or_update(&self, name: &str, update: RoleUpdate, is_create: bool) -> AppResult<RoleEntry> {
        let name = normalize_role_name(name)?;
        let _w = self.lock.write().await;
        self.non_locked_create_or_update(name, update, is_create).await
    }

    async fn non_locked_create_or_update(&self, name: String, update: RoleUpdate, is_create: bool) -> AppResult<RoleEntry> {
        let mut entry = match self.non_locked_get(&name).await? {
            Some(existing) => existing,
            None if is_create => RoleEntry::new(name.clone()),
            None => return Err(AppError::not_found("role_not_found", "the specified role does not exist")),
        };

        if let Some(ids) = update.allowed_group_ids {
            let ids = ids.into_vec();
            if ids.len() > MAX_GROUP_IDS_PER_ROLE {
                return Err(AppError::validation(
                    "too_many_group_ids".to_string(),
                    format!("number of group ids for this role exceeds the limit of {}", MAX_GROUP_IDS_PER_ROLE),
                ));
            }
            entry.allowed_group_ids = ids;
        }
        entry.token_params.merge(update.token)?;

        self.storage.put(StorageEntry::json(role_key(&name), &entry)?).await?;
        info!(
            target: "ociauth::role",
            role = %name,
            groups = entry.allowed_group_ids.len(),
            policies = ?entry.token_params.token_policies,
            "role {}", if is_create { "created" } else { "updated" }
        );
        Ok(entry)
    }

    /// Create when absent, update when present, decided under the same write lock.
    pub async fn write(&self, name: &str, update: RoleUpdate) -> AppResult<RoleEntry> {
        let name = normalize_role_name(name)?;
        let _w = self.lock.write().await;
        let is_create = self.non_locked_get(&name).await?.is_none();
        self.non_locked_create_or_update(name, update, is_create).await
    }

    /// Idempotent: deleting an absent role succeeds.
    pub async fn delete(&self, name: &str) -> AppResult<()> {
        let name = normalize_role_name(name)?;
        let _w = self.lock.write().await;
        self.storage.delete(&role_key(&name)).await?;
        info!(target: "ociauth::role", role = %name, "role deleted");
        Ok(())
    }

    pub async fn list(&self) -> AppResult<Vec<String>> {
        let _r = self.lock.read().await;
        let names: Vec<String> = self.storage.list(ROLE_PREFIX).await?
            .into_iter()
            .filter(|n| !n.ends_with('/'))
            .collect();
        debug!(target: "ociauth::role", count = names.len(), "roles listed");
        Ok(names)
    }
}
