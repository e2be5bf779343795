//! Request derivation
//!
//! Turns a [`QueryState`] into an ordered [`ListRequest`]:
//!
//! 1. scope parameters, then quick-filter parameters
//! 2. each filter's serialized parameters, in filter order
//! 3. `ordering`: sort keys joined with `,`, `-` prefix for descending
//! 4. `page`, `page_size`
//! 5. `advanced_search`: advanced token ids joined with `,`
//!
//! `ordering` and `advanced_search` are omitted when empty.

use tracing::{debug, warn};

use crate::descriptor::{SerializeContext, TableSchema};
use crate::query::{AdvancedToken, QueryState, SortKey};
use crate::traits::ListRequest;

/// Parameter carrying the sort order
pub const ORDERING_PARAM: &str = "ordering";
/// Parameter carrying the advanced search expression
pub const ADVANCED_SEARCH_PARAM: &str = "advanced_search";
/// Page number parameter
pub const PAGE_PARAM: &str = "page";
/// Page size parameter
pub const PAGE_SIZE_PARAM: &str = "page_size";

/// Wire value of the ordering, `None` when unsorted
pub fn ordering_param(sort: &[SortKey]) -> Option<String> {
    if sort.is_empty() {
        return None;
    }
    Some(
        sort.iter()
            .map(SortKey::to_param)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Wire value of the advanced search, `None` without tokens
pub fn advanced_search_param(tokens: &[AdvancedToken]) -> Option<String> {
    if tokens.is_empty() {
        return None;
    }
    Some(
        tokens
            .iter()
            .map(|t| t.id.as_str())
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Derive the list request for the current state
pub fn derive_request(
    schema: &TableSchema,
    state: &QueryState,
    ctx: &SerializeContext<'_>,
) -> ListRequest {
    let mut request = ListRequest::new(schema.endpoint.clone());

    for (key, value) in state.scope() {
        request.push(key.clone(), value.clone());
    }
    if let Some(quick) = state.quick_filter() {
        for (key, value) in &quick.params {
            request.push(key.clone(), value.clone());
        }
    }

    for (field, value) in state.filters() {
        match schema.serialize_filter(field, value, ctx) {
            Ok(params) => {
                for (key, value) in params {
                    request.push(key, value);
                }
            }
            // State only holds values the schema accepted; this is a schema
            // swapped under a live state.
            Err(e) => warn!("Skipping filter on {}.{}: {}", schema.screen, field, e),
        }
    }

    if let Some(ordering) = ordering_param(state.sort()) {
        request.push(ORDERING_PARAM, ordering);
    }
    request.push(PAGE_PARAM, state.page().to_string());
    request.push(PAGE_SIZE_PARAM, state.page_size().to_string());
    if let Some(search) = advanced_search_param(state.advanced_filters()) {
        request.push(ADVANCED_SEARCH_PARAM, search);
    }

    debug!("Derived {} request: {:?}", schema.screen, request.params);
    request
}
