// # File Key-Value Store
//
// File-based implementation of KeyValueStore with crash recovery.
//
// ## Purpose
//
// Keeps column layouts and persisted queries across console runs, the way a
// browser keeps them in local storage.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: the previous file is kept as `.backup`
// - Corruption detection: JSON validation on load
// - Recovery: falls back to the backup, then to an empty store
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "users.columns": "{\"first_name\":false}",
//     "hosts.query": "{\"version\":1,...}"
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::kv_store::{KeyValueStore, KeyValueStoreFactory};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based key-value store
///
/// Every write is flushed to disk before it returns.
///
/// # Example
///
/// ```rust,no_run
/// use ipam_view_core::state::FileKeyValueStore;
/// use ipam_view_core::traits::KeyValueStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileKeyValueStore::new("/var/lib/ipam-console/views.json").await?;
///
///     store.set("hosts.columns", r#"{"changed":true}"#).await?;
///     let raw = store.get("hosts.columns").await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    entries: BTreeMap<String, String>,
    dirty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreFileFormat {
    version: String,
    entries: BTreeMap<String, String>,
}

impl FileKeyValueStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. On corruption, load the backup instead
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create store directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                entries,
                dirty: false,
            })),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, String>, Error> {
        match Self::load(path).await {
            Ok(entries) => {
                tracing::debug!("Loaded {} store entries from {}", entries.len(), path.display());
                Ok(entries)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with an empty store.");
                    return Ok(BTreeMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(entries) => {
                        tracing::info!("Recovered {} store entries from backup", entries.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(entries)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with an empty store.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<BTreeMap<String, String>, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| io_failure("read", path, e))?;

        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Loading anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.entries)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            entries: state.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path)
                .await
                .map_err(|e| io_failure("create", &temp_path, e))?;
            temp.write_all(json.as_bytes())
                .await
                .map_err(|e| io_failure("write", &temp_path, e))?;
            temp.flush()
                .await
                .map_err(|e| io_failure("flush", &temp_path, e))?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to back up {}: {}", self.path.display(), e);
        }

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| io_failure("replace", &self.path, e))?;

        state.dirty = false;
        tracing::trace!("Store written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

fn io_failure(action: &str, path: &Path, err: std::io::Error) -> Error {
    Error::store(format!("Failed to {} {}: {}", action, path.display(), err))
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.state.read().await.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            if state.entries.get(key).map(String::as_str) == Some(value) {
                return Ok(());
            }
            state.entries.insert(key.to_string(), value.to_string());
            state.dirty = true;
        }
        self.write().await
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            if state.entries.remove(key).is_none() {
                return Ok(());
            }
            state.dirty = true;
        }
        self.write().await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.read().await.entries.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write().await
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileStoreConfig {
    path: String,
}

/// Factory for `{"type": "file", "path": "..."}`
#[derive(Debug, Clone, Copy, Default)]
pub struct FileKeyValueStoreFactory;

#[async_trait]
impl KeyValueStoreFactory for FileKeyValueStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn KeyValueStore>, Error> {
        let config: FileStoreConfig = serde_json::from_value(config.clone())
            .map_err(|e| Error::config(format!("Invalid file store config: {}", e)))?;
        Ok(Arc::new(FileKeyValueStore::new(config.path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());

        store.set("users.columns", r#"{"email":false}"#).await.unwrap();
        assert!(path.exists());

        let reopened = FileKeyValueStore::new(&path).await.unwrap();
        assert_eq!(
            reopened.get("users.columns").await.unwrap().as_deref(),
            Some(r#"{"email":false}"#)
        );
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.json");

        let store = FileKeyValueStore::new(&path).await.unwrap();
        store.set("hosts.columns", "first").await.unwrap();
        store.set("hosts.columns", "second").await.unwrap();

        let backup_path = FileKeyValueStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after second write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileKeyValueStore::new(&path).await.unwrap();
        assert_eq!(
            recovered.get("hosts.columns").await.unwrap().as_deref(),
            Some("first"),
            "Backup holds the state before the last write"
        );
    }

    #[tokio::test]
    async fn test_file_store_starts_empty_without_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("views.json");
        fs::write(&path, b"{{{").await.unwrap();

        let store = FileKeyValueStore::new(&path).await.unwrap();
        assert!(store.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_factory_reads_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("views.json");
        let config = serde_json::json!({ "type": "file", "path": path.to_string_lossy() });

        let store = FileKeyValueStoreFactory.create(&config).await.unwrap();
        store.set("k", "v").await.unwrap();
        assert!(path.exists());

        let bad = FileKeyValueStoreFactory
            .create(&serde_json::json!({ "type": "file" }))
            .await;
        assert!(bad.is_err());
    }
}
