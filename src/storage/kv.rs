use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{list_children, validate_key, Storage, StorageEntry, StorageError};

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) value: Vec<u8>,
    pub(crate) version: u64,
}

/// In-memory key-value substrate. Clones share the same map.
#[derive(Clone, Default)]
pub struct InmemStorage {
    map: Arc<RwLock<BTreeMap<String, Slot>>>,
}

impl InmemStorage {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn from_slots(slots: BTreeMap<String, Slot>) -> Self {
        Self { map: Arc::new(RwLock::new(slots)) }
    }

    pub(crate) fn slots(&self) -> BTreeMap<String, Slot> { self.map.read().clone() }

    /// Swap in a whole map, e.g. once a persisted snapshot of it is on disk.
    pub(crate) fn replace(&self, slots: BTreeMap<String, Slot>) { *self.map.write() = slots; }

    pub fn len(&self) -> usize { self.map.read().len() }

    pub fn is_empty(&self) -> bool { self.map.read().is_empty() }

    pub(crate) fn get_sync(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> {
        validate_key(key)?;
        let r = self.map.read();
        Ok(r.get(key).map(|s| StorageEntry { key: key.to_string(), value: s.value.clone(), version: s.version }))
    }

    pub(crate) fn put_sync(&self, entry: StorageEntry) -> Result<u64, StorageError> {
        validate_key(&entry.key)?;
        Ok(put_slot(&mut self.map.write(), entry))
    }

    pub(crate) fn delete_sync(&self, key: &str) -> Result<bool, StorageError> {
        validate_key(key)?;
        Ok(self.map.write().remove(key).is_some())
    }

    pub(crate) fn list_sync(&self, prefix: &str) -> Vec<String> {
        let r = self.map.read();
        list_children(r.keys(), prefix)
    }
}

#[async_trait]
impl Storage for InmemStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> { self.get_sync(key) }

    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError> {
        self.put_sync(entry).map(|_| ())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.delete_sync(key).map(|_| ())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> { Ok(self.list_sync(prefix)) }
}

/// Insert `entry`, bumping the key's version. Returns the new version.
pub(crate) fn put_slot(map: &mut BTreeMap<String, Slot>, entry: StorageEntry) -> u64 {
    let version = map.get(&entry.key).map(|s| s.version + 1).unwrap_or(1);
    map.insert(entry.key, Slot { value: entry.value, version });
    version
}
