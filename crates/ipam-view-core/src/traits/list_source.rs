// # List Source Trait
//
// Defines the interface to the remote paged-list collaborator (one REST list
// endpoint per table) and to the lookup/vocabulary endpoints that feed
// exact-match options and the address-type resolution.
//
// ## Implementations
//
// - openIPAM REST API v2: `ipam-source-rest` crate
// - Tests and embedding: any in-process implementation
//
// ## Usage
//
// ```rust,ignore
// use ipam_view_core::traits::{ListRequest, ListSource};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* ListSource implementation */;
//
//     let request = ListRequest::new("hosts/")
//         .with_param("hostname", "web")
//         .with_param("page", "1");
//     let page = source.fetch_page(&request).await?;
//     println!("{} of {} rows", page.items.len(), page.total_count);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One opaque domain record returned by a list endpoint
///
/// The core only looks at the stable key field and at the fields named by
/// column descriptors; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(pub serde_json::Value);

impl Row {
    /// Wrap a JSON value
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Get a top-level field
    pub fn get(&self, field: &str) -> Option<&serde_json::Value> {
        self.0.get(field)
    }

    /// Extract the stable row identifier stored in `key_field`
    ///
    /// Strings are returned as-is, numbers are rendered in decimal.
    pub fn key(&self, key_field: &str) -> Option<String> {
        match self.0.get(key_field)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Deserialize into a typed read model (see [`crate::model`])
    pub fn to_model<T: serde::de::DeserializeOwned>(&self) -> Result<T, crate::Error> {
        Ok(serde_json::from_value(self.0.clone())?)
    }

    /// Access the underlying JSON value
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for Row {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One page of a remote list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageResult {
    /// Rows on this page, in backend order
    pub items: Vec<Row>,
    /// Total number of rows matching the request (all pages)
    pub total_count: u64,
    /// Whether a further page exists
    pub has_next: bool,
}

/// A list request: endpoint plus ordered query parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Endpoint path relative to the API base (e.g. `"hosts/"`)
    pub endpoint: String,
    /// Query parameters in derivation order
    pub params: Vec<(String, String)>,
}

impl ListRequest {
    /// Create a request with no parameters
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    /// Append a parameter (builder style)
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.push((key.into(), value.into()));
    }

    /// Replace the value of `key`, appending it if absent
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.params.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.params.push((key.to_string(), value)),
        }
    }

    /// First value recorded for `key`
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `key` is present
    pub fn has_param(&self, key: &str) -> bool {
        self.param(key).is_some()
    }

    /// The 1-based page this request asks for (defaults to 1)
    pub fn page(&self) -> u32 {
        self.param("page").and_then(|p| p.parse().ok()).unwrap_or(1)
    }
}

/// One entry of a lookup/vocabulary list (address types, DNS types, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    /// Backend identifier
    pub id: i64,
    /// Human-readable name
    pub name: String,
}

/// Trait for remote list collaborators
///
/// # Contract
///
/// - One call, one HTTP request. No retries, no caching, no background tasks:
///   the fetch coordinator owns sequencing, staleness and failure handling.
/// - Out-of-range pages return an empty `items` list, not an error, when the
///   backend allows it.
/// - Implementations must be thread-safe; the coordinator calls them from
///   spawned tasks.
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Fetch one page for the given request
    ///
    /// # Returns
    ///
    /// - `Ok(PageResult)`: The page
    /// - `Err(Error)`: Network/server failure (surfaced as a fetch failure)
    async fn fetch_page(&self, request: &ListRequest) -> Result<PageResult, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Trait for lookup/vocabulary collaborators
#[async_trait]
pub trait LookupSource: Send + Sync {
    /// Fetch the full lookup list served at `endpoint`
    async fn fetch_lookup(&self, endpoint: &str) -> Result<Vec<LookupEntry>, crate::Error>;
}

/// Shared handles to the remote collaborators of one backend
///
/// Most backends serve both lists and lookups from the same client, so a
/// factory hands out both trait objects pointing at one instance.
#[derive(Clone)]
pub struct SourceHandle {
    /// Paged-list collaborator
    pub list: Arc<dyn ListSource>,
    /// Lookup/vocabulary collaborator
    pub lookup: Arc<dyn LookupSource>,
}

impl SourceHandle {
    /// Build a handle from one value implementing both traits
    pub fn from_shared<T: ListSource + LookupSource + 'static>(source: Arc<T>) -> Self {
        Self {
            list: source.clone(),
            lookup: source,
        }
    }
}

impl std::fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceHandle")
            .field("list", &self.list.source_name())
            .finish()
    }
}

/// Helper trait for constructing remote sources from configuration
pub trait ListSourceFactory: Send + Sync {
    /// Create source handles from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this source
    ///
    /// # Returns
    ///
    /// A [`SourceHandle`] serving lists and lookups
    fn create(&self, config: &crate::config::SourceConfig) -> Result<SourceHandle, crate::Error>;
}
