use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::kv::{put_slot, Slot};
use super::{validate_key, InmemStorage, Storage, StorageEntry, StorageError};

#[derive(Serialize, Deserialize)]
struct SnapEntry { key: String, value_b64: String, version: u64 }

#[derive(Serialize, Deserialize)]
struct Snapshot { version: u32, created_ms: i64, entries: Vec<SnapEntry> }

/// In-memory map mirrored to `<dir>/storage.json` after every mutation.
///
/// A mutation is applied to a copy of the map, the copy is written to a temp file and
/// renamed into place, and only then does it replace the live map. A failed write
/// leaves both memory and disk at the previous state.
#[derive(Clone)]
pub struct FileStorage {
    dir: PathBuf,
    mem: InmemStorage,
    /// Serializes mutations so each one starts from the last committed map.
    write_guard: Arc<Mutex<()>>,
}

impl FileStorage {
    /// Open (or create) a store rooted at `dir`, loading an existing snapshot if present.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mem = match Self::load_snapshot(&dir.join("storage.json"))? {
            Some(slots) => InmemStorage::from_slots(slots),
            None => InmemStorage::new(),
        };
        debug!(target: "ociauth::storage", "file storage opened dir='{}' keys={}", dir.display(), mem.len());
        Ok(Self { dir, mem, write_guard: Arc::new(Mutex::new(())) })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    fn snapshot_path(&self) -> PathBuf { self.dir.join("storage.json") }

    fn load_snapshot(path: &Path) -> Result<Option<BTreeMap<String, Slot>>, StorageError> {
        if !path.exists() { return Ok(None); }
        let bytes = std::fs::read(path)?;
        let snap: Snapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::Decode { key: path.display().to_string(), reason: e.to_string() })?;
        let mut slots = BTreeMap::new();
        for e in snap.entries.into_iter() {
            match base64::engine::general_purpose::STANDARD.decode(e.value_b64.as_bytes()) {
                Ok(value) => { slots.insert(e.key, Slot { value, version: e.version }); }
                Err(err) => warn!(target: "ociauth::storage", "skipping undecodable snapshot entry '{}': {}", e.key, err),
            }
        }
        Ok(Some(slots))
    }

    fn write_snapshot(path: &Path, slots: &BTreeMap<String, Slot>) -> Result<(), StorageError> {
        let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0);
        let entries = slots.iter()
            .map(|(key, s)| SnapEntry {
                key: key.clone(),
                value_b64: base64::engine::general_purpose::STANDARD.encode(&s.value),
                version: s.version,
            })
            .collect();
        let snap = Snapshot { version: 1, created_ms: now_ms, entries };
        let bytes = serde_json::to_vec_pretty(&snap)
            .map_err(|e| StorageError::Encode { key: "storage.json".into(), reason: e.to_string() })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(tmp, path)?;
        Ok(())
    }

    /// Persist `candidate` on the blocking pool, then make it the live map.
    async fn commit(&self, candidate: BTreeMap<String, Slot>) -> Result<(), StorageError> {
        let path = self.snapshot_path();
        let persisted = tokio::task::spawn_blocking(move || Self::write_snapshot(&path, &candidate).map(|_| candidate))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))??;
        self.mem.replace(persisted);
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<StorageEntry>, StorageError> { self.mem.get_sync(key) }

    async fn put(&self, entry: StorageEntry) -> Result<(), StorageError> {
        validate_key(&entry.key)?;
        let _g = self.write_guard.lock().await;
        let mut candidate = self.mem.slots();
        put_slot(&mut candidate, entry);
        self.commit(candidate).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let _g = self.write_guard.lock().await;
        let mut candidate = self.mem.slots();
        if candidate.remove(key).is_none() {
            return Ok(());
        }
        self.commit(candidate).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> { Ok(self.mem.list_sync(prefix)) }
}
