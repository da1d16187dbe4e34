//!
//! ociauth storage module
//! ----------------------
//! The backend persists exactly two kinds of record: the singleton tenancy config under
//! `config` and one entry per role under `role/<name>`. This module defines the host-style
//! key-value substrate those records live in.
//!
//! The substrate only promises get/put/delete/list. It does not offer compare-and-swap, so
//! stores that need check-then-act semantics hold their own lock across the sequence.
//! Every put bumps a per-key version counter, which is informational only.
//!
//! Two implementations are provided:
//! - `InmemStorage`: an in-memory map, used by tests and ephemeral deployments.
//! - `FileStorage`: the same map persisted to a JSON snapshot after every mutation.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

pub mod kv;
pub mod file;

pub use kv::InmemStorage;
pub use file::FileStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode entry '{key}': {reason}")]
    Encode { key: String, reason: String },
    #[error("failed to decode entry '{key}': {reason}")]
    Decode { key: String, reason: String },
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
}

/// A single stored value. `version` is assigned by the substrate on put and starts at 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub version: u64,
}

impl StorageEntry {
    /// Serialize `value` as JSON under `key`. The version is filled in by the substrate.
    pub fn json<T: Serialize>(key: impl Into<String>, value: &T) -> Result<Self, StorageError> {
        let key = key.into();
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StorageError::Encode { key: key.clone(), reason: e.to_string() })?;
        Ok(Self { key, value: bytes, version: 0 })
    }

    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_slice(&self.value)
            .map_err(|e| StorageError::Decode { key: self.key.clone(), reason: e.to_string() })
    }
}

/// Host-provided key-value storage.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError>;
    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError>;
    /// Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// Immediate children of `prefix`, with the prefix stripped. Nested keys are
    /// collapsed to their first segment with a trailing `/`. Sorted, de-duplicated.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.contains("..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Shared listing rule used by both substrates.
pub(crate) fn list_children<'a, I>(keys: I, prefix: &str) -> Vec<String>
where
    I: Iterator<Item = &'a String>,
{
    let mut out: Vec<String> = Vec::new();
    for k in keys {
        let Some(rest) = k.strip_prefix(prefix) else { continue; };
        if rest.is_empty() { continue; }
        let child = match rest.find('/') {
            Some(i) => rest[..=i].to_string(),
            None => rest.to_string(),
        };
        out.push(child);
    }
    out.sort();
    out.dedup();
    out
}
