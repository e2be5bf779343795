// # Key-Value Store Trait
//
// Defines the interface for the persistent key-value store that backs column
// visibility and, on screens that opt in, the full query state.
//
// ## Purpose
//
// A screen restores exactly where the operator left off: which columns were
// shown, and (where enabled) the filters, sort order and page.
//
// ## Implementations
//
// - File-based: one JSON document holding all keys
// - In-memory: non-persistent, for tests and embedding
//
// ## Usage
//
// ```rust,ignore
// use ipam_view_core::KeyValueStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* KeyValueStore implementation */;
//
//     store.set("users.columns", r#"{"first_name":false}"#).await?;
//     let raw = store.get("users.columns").await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;

/// Trait for key-value store implementations
///
/// Values are opaque strings (JSON documents in practice).
///
/// # Contract
///
/// - Writes are last-write-wins per key.
/// - Callers treat every error as "feature degrades to defaults"; stores should
///   still report failures accurately so they can be logged.
/// - All methods must be safe to call concurrently.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    ///
    /// # Returns
    ///
    /// - `Ok(Some(String))`: The stored value
    /// - `Ok(None)`: Key not present
    /// - `Err(Error)`: Storage error
    async fn get(&self, key: &str) -> Result<Option<String>, crate::Error>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<(), crate::Error>;

    /// Remove a key (succeeds when the key is absent)
    async fn remove(&self, key: &str) -> Result<(), crate::Error>;

    /// List all keys in the store
    async fn keys(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing key-value stores from configuration
#[async_trait]
pub trait KeyValueStoreFactory: Send + Sync {
    /// Create a KeyValueStore instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Serialized store configuration
    ///
    /// # Returns
    ///
    /// A shared KeyValueStore trait object
    async fn create(
        &self,
        config: &serde_json::Value,
    ) -> Result<std::sync::Arc<dyn KeyValueStore>, crate::Error>;
}
