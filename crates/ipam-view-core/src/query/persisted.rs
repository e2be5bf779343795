// # Persisted Query Record
//
// Versioned record of the part of a screen's query that survives a restart:
// filters, sort order, page, page size and advanced-search tokens.
//
// ## Keys
//
// - `"{screen}.query"`: this record, as JSON
// - `"{screen}.columns"`: column visibility, as a JSON object `field -> bool`
//
// ## Fallback Policy
//
// - Absent key: defaults
// - Parse failure: defaults (logged)
// - Unknown version: defaults (logged)
// - Entries that no longer fit the schema are dropped on restore
//
// ## Format
//
// ```json
// {
//   "version": 1,
//   "filters": [{ "field": "hostname", "value": { "kind": "text", "value": "web" } }],
//   "sort": [{ "field": "expires", "descending": true }],
//   "page": 1,
//   "page_size": 25,
//   "advanced_filters": []
// }
// ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use super::{AdvancedToken, FilterValue, SortKey};

/// Current record version
pub const PERSISTED_QUERY_VERSION: u32 = 1;

/// One persisted predicate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedFilter {
    pub field: String,
    pub value: FilterValue,
}

/// Persisted query record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedQuery {
    pub version: u32,
    #[serde(default)]
    pub filters: Vec<PersistedFilter>,
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default = "default_page")]
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub advanced_filters: Vec<AdvancedToken>,
}

fn default_page() -> u32 {
    1
}

impl PersistedQuery {
    /// Store key of the query record for `screen`
    pub fn key(screen: &str) -> String {
        format!("{}.query", screen)
    }

    /// Store key of the column layout for `screen`
    pub fn columns_key(screen: &str) -> String {
        format!("{}.columns", screen)
    }

    /// Encode for the store
    pub fn encode(&self) -> Result<String, crate::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored record, `None` meaning "use defaults"
    pub fn decode(raw: &str) -> Option<PersistedQuery> {
        let record: PersistedQuery = match serde_json::from_str(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Ignoring unreadable persisted query: {}", e);
                return None;
            }
        };

        if record.version != PERSISTED_QUERY_VERSION {
            warn!(
                "Ignoring persisted query version {} (expected {})",
                record.version, PERSISTED_QUERY_VERSION
            );
            return None;
        }

        Some(record)
    }
}

/// Encode a column layout for the store
pub fn encode_columns(visibility: &BTreeMap<String, bool>) -> Result<String, crate::Error> {
    Ok(serde_json::to_string(visibility)?)
}

/// Decode a stored column layout, `None` meaning "use defaults"
pub fn decode_columns(raw: &str) -> Option<BTreeMap<String, bool>> {
    match serde_json::from_str(raw) {
        Ok(visibility) => Some(visibility),
        Err(e) => {
            warn!("Ignoring unreadable persisted column layout: {}", e);
            None
        }
    }
}
