//! Plugin-based source registry
//!
//! The registry lets remote list sources and key-value stores be registered
//! by name at runtime, so the console picks implementations from
//! configuration instead of a hardcoded match.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipam_view_core::registry::SourceRegistry;
//! use ipam_view_core::config::SourceConfig;
//!
//! let registry = SourceRegistry::with_builtin_stores();
//! ipam_source_rest::register(&registry);
//!
//! let config = SourceConfig::Rest { ... };
//! let sources = registry.create_source(&config)?;
//! ```
//!
//! ## Registration
//!
//! Source crates register themselves during initialization:
//!
//! ```rust,ignore
//! // In ipam-source-rest
//! pub fn register(registry: &SourceRegistry) {
//!     registry.register_source("rest", Box::new(RestFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{SourceConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::state::{FileKeyValueStoreFactory, MemoryKeyValueStoreFactory};
use crate::traits::{KeyValueStore, KeyValueStoreFactory, ListSourceFactory, SourceHandle};

/// Registry of source and store factories
///
/// ## Thread Safety
///
/// Interior mutability with RwLock: concurrent reads, exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    /// Registered list source factories
    sources: RwLock<HashMap<String, Box<dyn ListSourceFactory>>>,

    /// Registered key-value store factories
    stores: RwLock<HashMap<String, Arc<dyn KeyValueStoreFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `file` and `memory` stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_store("file", Box::new(FileKeyValueStoreFactory));
        registry.register_store("memory", Box::new(MemoryKeyValueStoreFactory));
        registry
    }

    /// Register a list source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "rest")
    /// - `factory`: Factory object for creating source handles
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn ListSourceFactory>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Register a key-value store factory
    ///
    /// # Parameters
    ///
    /// - `name`: Store type name (e.g., "file", "memory")
    /// - `factory`: Factory object for creating store instances
    pub fn register_store(&self, name: impl Into<String>, factory: Box<dyn KeyValueStoreFactory>) {
        let mut stores = self.stores.write().unwrap_or_else(PoisonError::into_inner);
        stores.insert(name.into(), Arc::from(factory));
    }

    /// Create source handles from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(SourceHandle)`: List and lookup collaborators
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<SourceHandle> {
        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a key-value store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn KeyValueStore>)`: Created store
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create_store(&self, config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
        let factory = {
            let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
            stores
                .get(config.type_name())
                .ok_or_else(|| {
                    Error::config(format!("Unknown store type: {}", config.type_name()))
                })?
                .clone()
        };

        let config_json = match config {
            StoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        // Lock released before the async create
        factory.create(&config_json).await
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// List all registered store types
    pub fn list_stores(&self) -> Vec<String> {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }

    /// Check if a store type is registered
    pub fn has_store(&self, name: &str) -> bool {
        let stores = self.stores.read().unwrap_or_else(PoisonError::into_inner);
        stores.contains_key(name)
    }
}
