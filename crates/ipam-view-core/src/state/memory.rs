// # Memory Key-Value Store
//
// In-memory implementation of KeyValueStore.
//
// ## Purpose
//
// Provides a simple store that doesn't persist across restarts. Screens
// opened against it start from schema defaults every time.
//
// ## When to Use
//
// - Testing environments
// - Embedding where the host application owns persistence
// - One-shot console runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::kv_store::{KeyValueStore, KeyValueStoreFactory};

/// In-memory key-value store
///
/// Clones share the same map.
///
/// # Example
///
/// ```rust,no_run
/// use ipam_view_core::state::MemoryKeyValueStore;
/// use ipam_view_core::traits::KeyValueStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKeyValueStore::new();
///
///     store.set("users.columns", r#"{"email":false}"#).await?;
///     assert!(store.get("users.columns").await?.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove every key
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Error> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let mut keys: Vec<String> = self.inner.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}

/// Factory for `{"type": "memory"}`
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryKeyValueStoreFactory;

#[async_trait]
impl KeyValueStoreFactory for MemoryKeyValueStoreFactory {
    async fn create(
        &self,
        _config: &serde_json::Value,
    ) -> Result<Arc<dyn KeyValueStore>, Error> {
        Ok(Arc::new(MemoryKeyValueStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryKeyValueStore::new();
        assert!(store.is_empty().await);

        store.set("hosts.query", "{}").await.unwrap();
        store.set("hosts.columns", "{}").await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("hosts.query").await.unwrap().as_deref(), Some("{}"));

        store.remove("hosts.query").await.unwrap();
        store.remove("never-set").await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec!["hosts.columns".to_string()]);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let store = MemoryKeyValueStore::new();
        store.set("k", "1").await.unwrap();
        store.set("k", "2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryKeyValueStore::new();
        let other = store.clone();
        store.set("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
