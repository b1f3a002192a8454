//! Storage service: a persistent string key/value store backed by a JSON
//! file in the data directory.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::{MethodTable, Service};

const FILE_NAME: &str = "storage.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Storage file {path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub struct StorageService {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    dirty: AtomicBool,
    /// Held across snapshot, write and rename so saves never overlap.
    save_lock: tokio::sync::Mutex<()>,
}

impl Default for StorageService {
    fn default() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("interop-bridge");
        Self::in_dir(dir)
    }
}

impl StorageService {
    /// Store backed by the file at `path`. Nothing is read until `load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: RwLock::new(BTreeMap::new()),
            dirty: AtomicBool::new(false),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Store backed by `storage.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory contents with the file's. A missing file loads
    /// as an empty store.
    pub async fn load(&self) -> Result<usize, StorageError> {
        let loaded = match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice::<BTreeMap<String, String>>(&bytes).map_err(
                |source| StorageError::Json {
                    path: self.path.clone(),
                    source,
                },
            )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let count = loaded.len();
        let mut entries = self.entries.write();
        *entries = loaded;
        self.dirty.store(false, Ordering::SeqCst);
        drop(entries);
        info!("Loaded {count} storage entries from {}", self.path.display());
        Ok(count)
    }

    /// Write the store to disk through a temporary file and a rename.
    pub async fn save(&self) -> Result<(), StorageError> {
        let _guard = self.save_lock.lock().await;

        // Snapshot and clear the flag under one lock; later edits mark it again.
        let bytes = {
            let entries = self.entries.read();
            let bytes = serde_json::to_vec_pretty(&*entries).map_err(|source| StorageError::Json {
                path: self.path.clone(),
                source,
            })?;
            self.dirty.store(false, Ordering::SeqCst);
            bytes
        };

        if let Err(e) = self.write_file(&bytes).await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        debug!("Saved storage to {}", self.path.display());
        Ok(())
    }

    async fn write_file(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)
    }

    /// Save only if something changed since the last load or save.
    pub async fn flush(&self) -> Result<bool, StorageError> {
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.save().await?;
        Ok(true)
    }

    /// Stored value, or the empty string when unset.
    pub fn get(&self, key: &str) -> String {
        self.entries.read().get(key).cloned().unwrap_or_default()
    }

    pub fn set(&self, key: String, value: String) {
        let mut entries = self.entries.write();
        entries.insert(key, value);
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write();
        let removed = entries.remove(key).is_some();
        if removed {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    pub fn get_all(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

impl Service for StorageService {
    const NAME: &'static str = "Storage";

    fn methods(table: MethodTable<Self>) -> MethodTable<Self> {
        table
            .asynchronous("Load", |s: Arc<Self>, (): ()| async move {
                s.load().await.map(|_| ())
            })
            .asynchronous("Save", |s: Arc<Self>, (): ()| async move { s.save().await })
            .asynchronous("Flush", |s: Arc<Self>, (): ()| async move { s.flush().await })
            .sync("Get", |s, (key,): (String,)| Ok::<_, Infallible>(s.get(&key)))
            .sync("Set", |s, (key, value): (String, String)| {
                s.set(key, value);
                Ok::<_, Infallible>(())
            })
            .sync("Remove", |s, (key,): (String,)| Ok::<_, Infallible>(s.remove(&key)))
            .sync("GetAll", |s, (): ()| Ok::<_, Infallible>(s.get_all()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::in_dir(dir.path());
        assert_eq!(storage.load().await.unwrap(), 0);
        assert_eq!(storage.get("anything"), "");
    }

    #[tokio::test]
    async fn save_then_load_in_fresh_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let storage = StorageService::new(&path);
        storage.set("theme".into(), "dark".into());
        storage.set("zoom".into(), "1.25".into());
        storage.save().await.unwrap();
        assert!(!storage.is_dirty());

        let reopened = StorageService::new(&path);
        assert_eq!(reopened.load().await.unwrap(), 2);
        assert_eq!(reopened.get("theme"), "dark");
        assert_eq!(reopened.get_all().len(), 2);
    }

    #[tokio::test]
    async fn flush_saves_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::in_dir(dir.path());
        assert!(!storage.flush().await.unwrap());
        assert!(!storage.path().exists());

        storage.set("k".into(), "v".into());
        assert!(storage.flush().await.unwrap());
        assert!(storage.path().exists());
        assert!(!storage.flush().await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::in_dir(dir.path());
        std::fs::write(storage.path(), b"{not json").unwrap();
        assert!(matches!(storage.load().await, Err(StorageError::Json { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_saves_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageService::in_dir(dir.path()));
        for i in 0..2000 {
            storage.set(format!("key{i}"), i.to_string());
        }

        for round in 0..20 {
            let tasks: Vec<_> = (0..8)
                .map(|n| {
                    let storage = storage.clone();
                    tokio::spawn(async move {
                        storage.set(format!("round{round}-{n}"), "x".into());
                        storage.save().await
                    })
                })
                .collect();
            for task in tasks {
                task.await.unwrap().unwrap();
            }
        }

        assert!(!storage.path().with_extension("json.tmp").exists());
        let reopened = StorageService::new(storage.path());
        assert_eq!(reopened.load().await.unwrap(), storage.get_all().len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn edits_racing_a_save_stay_dirty_until_written() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(StorageService::in_dir(dir.path()));
        storage.set("seed".into(), "1".into());

        let writer = {
            let storage = storage.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    storage.set(format!("k{i}"), i.to_string());
                    tokio::task::yield_now().await;
                }
            })
        };
        for _ in 0..20 {
            storage.save().await.unwrap();
        }
        writer.await.unwrap();

        // Whatever the last save missed must still be flagged.
        storage.flush().await.unwrap();
        let reopened = StorageService::new(storage.path());
        reopened.load().await.unwrap();
        assert_eq!(reopened.get_all(), storage.get_all());
    }

    #[test]
    fn remove_reports_presence() {
        let storage = StorageService::new("unused.json");
        storage.set("a".into(), "1".into());
        assert!(storage.remove("a"));
        assert!(!storage.remove("a"));
    }
}
