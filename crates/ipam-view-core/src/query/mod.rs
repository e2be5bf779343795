//! Query state store
//!
//! [`QueryState`] is the single source of truth for one screen: filter
//! predicates, sort order, page, page size, column visibility, selection,
//! advanced-search tokens and the fixed scope of the screen instance.
//!
//! Every mutation is synchronous and returns a [`StateChange`] describing
//! what the owner has to do next (refetch, persist the query, persist the
//! column layout). The state never talks to collaborators itself.
//!
//! Invariants held after every operation:
//! - `page >= 1`
//! - `page_size` is one of the schema's allowed sizes
//! - filters and sort only reference registered fields, sort only sortable ones
//! - at most one predicate per field

pub mod persisted;

pub use persisted::{PersistedFilter, PersistedQuery, PERSISTED_QUERY_VERSION};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::descriptor::{ExpirationBucket, FilterKind, TableSchema};
use crate::error::{Error, Result};

/// Filter predicate value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FilterValue {
    /// Substring/prefix text
    Text(String),
    /// One exact option
    Exact(String),
    /// Boolean predicate (the unset state is the absence of a predicate)
    Flag(bool),
    /// Date bounds, either side optional
    DateRange {
        from: Option<String>,
        to: Option<String>,
    },
    /// Named expiration bucket
    Expiration(ExpirationBucket),
    /// Address type by display name
    AddressType(String),
}

impl FilterValue {
    /// Whether the value means "no predicate"
    pub fn is_empty(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().is_none_or(|s| s.trim().is_empty());
        match self {
            FilterValue::Text(s) | FilterValue::Exact(s) | FilterValue::AddressType(s) => {
                s.trim().is_empty()
            }
            FilterValue::DateRange { from, to } => blank(from) && blank(to),
            FilterValue::Flag(_) | FilterValue::Expiration(_) => false,
        }
    }

    /// Short kind name for messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            FilterValue::Text(_) => "text",
            FilterValue::Exact(_) => "exact",
            FilterValue::Flag(_) => "boolean",
            FilterValue::DateRange { .. } => "date range",
            FilterValue::Expiration(_) => "expiration",
            FilterValue::AddressType(_) => "address type",
        }
    }
}

/// Boolean filter tri-state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    /// Next state: unset → true → false → unset
    pub fn cycle(self) -> Self {
        match self {
            TriState::Unset => TriState::True,
            TriState::True => TriState::False,
            TriState::False => TriState::Unset,
        }
    }

    /// Read the tri-state out of a stored predicate
    pub fn from_value(value: Option<&FilterValue>) -> Self {
        match value {
            Some(FilterValue::Flag(true)) => TriState::True,
            Some(FilterValue::Flag(false)) => TriState::False,
            _ => TriState::Unset,
        }
    }

    /// Predicate for this state (`None` when unset)
    pub fn to_value(self) -> Option<FilterValue> {
        match self {
            TriState::Unset => None,
            TriState::True => Some(FilterValue::Flag(true)),
            TriState::False => Some(FilterValue::Flag(false)),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One key of the ordering; primary key first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    /// Wire form: `field` or `-field`
    pub fn to_param(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

/// Free-form advanced search token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedToken {
    /// Search expression sent to the backend
    pub id: String,
    /// Text shown to the operator
    pub display: String,
}

/// Preset extra parameters (the hosts screen's "Mine", "Group", ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickFilter {
    pub label: String,
    pub params: Vec<(String, String)>,
}

impl QuickFilter {
    pub fn new(label: impl Into<String>, params: Vec<(String, String)>) -> Self {
        Self {
            label: label.into(),
            params,
        }
    }

    /// Hosts owned by `username`
    pub fn mine(username: &str) -> Self {
        Self::new("Mine", vec![("mine".to_string(), username.to_string())])
    }

    /// Hosts owned through the operator's groups
    pub fn group() -> Self {
        Self::new("Group", vec![("show_groups".to_string(), "true".to_string())])
    }

    /// Hosts last changed by `username`
    pub fn changed_by(username: &str) -> Self {
        Self::new(
            "Changed By Me",
            vec![("changed_by".to_string(), username.to_string())],
        )
    }
}

/// What the owner must do after a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateChange {
    /// Request parameters changed
    pub refetch: bool,
    /// Persisted query record is out of date
    pub persist_query: bool,
    /// Persisted column layout is out of date
    pub persist_columns: bool,
}

impl StateChange {
    /// Nothing to do
    pub const NONE: StateChange = StateChange {
        refetch: false,
        persist_query: false,
        persist_columns: false,
    };

    /// Query changed: refetch and persist
    pub const QUERY: StateChange = StateChange {
        refetch: true,
        persist_query: true,
        persist_columns: false,
    };

    /// Column layout changed
    pub const COLUMNS: StateChange = StateChange {
        refetch: false,
        persist_query: false,
        persist_columns: true,
    };

    /// Whether anything needs doing
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Everything either change asks for
    pub fn merge(self, other: StateChange) -> StateChange {
        StateChange {
            refetch: self.refetch || other.refetch,
            persist_query: self.persist_query || other.persist_query,
            persist_columns: self.persist_columns || other.persist_columns,
        }
    }
}

/// Owned copy of everything that shapes the request
#[derive(Debug, Clone, PartialEq, Eq)]
struct RequestShape {
    filters: Vec<(String, FilterValue)>,
    sort: Vec<SortKey>,
    page: u32,
    page_size: u32,
    advanced_filters: Vec<AdvancedToken>,
    scope: Vec<(String, String)>,
    quick_filter: Option<QuickFilter>,
}

/// Per-screen query state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryState {
    filters: Vec<(String, FilterValue)>,
    sort: Vec<SortKey>,
    page: u32,
    page_size: u32,
    column_visibility: BTreeMap<String, bool>,
    selection: BTreeSet<String>,
    select_all: bool,
    advanced_filters: Vec<AdvancedToken>,
    scope: Vec<(String, String)>,
    quick_filter: Option<QuickFilter>,
}

impl QueryState {
    /// Fresh state with the schema's defaults
    pub fn new(schema: &TableSchema) -> Self {
        Self {
            filters: Vec::new(),
            sort: Vec::new(),
            page: 1,
            page_size: schema.default_page_size,
            column_visibility: schema.default_visibility(),
            selection: BTreeSet::new(),
            select_all: false,
            advanced_filters: Vec::new(),
            scope: Vec::new(),
            quick_filter: None,
        }
    }

    // ---- reads ----

    /// Filter predicates in insertion order
    pub fn filters(&self) -> &[(String, FilterValue)] {
        &self.filters
    }

    /// Predicate on `field`, if any
    pub fn filter(&self, field: &str) -> Option<&FilterValue> {
        self.filters
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    pub fn sort(&self) -> &[SortKey] {
        &self.sort
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn column_visibility(&self) -> &BTreeMap<String, bool> {
        &self.column_visibility
    }

    /// Whether `field` is currently shown
    pub fn is_column_visible(&self, field: &str) -> bool {
        self.column_visibility.get(field).copied().unwrap_or(true)
    }

    /// Explicitly selected row ids
    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    /// Whether "select every matching row" is active
    pub fn select_all_active(&self) -> bool {
        self.select_all
    }

    /// Whether the row with `id` counts as selected
    pub fn is_selected(&self, id: &str) -> bool {
        self.select_all || self.selection.contains(id)
    }

    pub fn advanced_filters(&self) -> &[AdvancedToken] {
        &self.advanced_filters
    }

    pub fn scope(&self) -> &[(String, String)] {
        &self.scope
    }

    pub fn quick_filter(&self) -> Option<&QuickFilter> {
        self.quick_filter.as_ref()
    }

    fn shape(&self) -> RequestShape {
        RequestShape {
            filters: self.filters.clone(),
            sort: self.sort.clone(),
            page: self.page,
            page_size: self.page_size,
            advanced_filters: self.advanced_filters.clone(),
            scope: self.scope.clone(),
            quick_filter: self.quick_filter.clone(),
        }
    }

    fn change_since(&self, before: &RequestShape) -> StateChange {
        if self.shape() == *before {
            StateChange::NONE
        } else {
            StateChange::QUERY
        }
    }

    // ---- filters ----

    /// Upsert (or, for an empty value, remove) the predicate on `field`
    ///
    /// Resets the page to 1. Selection is left alone.
    pub fn set_filter(
        &mut self,
        schema: &TableSchema,
        field: &str,
        value: FilterValue,
    ) -> Result<StateChange> {
        schema.check_value(field, &value)?;
        let before = self.shape();

        let slot = self.filters.iter().position(|(f, _)| f == field);
        match (slot, value.is_empty()) {
            (Some(i), true) => {
                self.filters.remove(i);
            }
            (Some(i), false) => self.filters[i].1 = value,
            (None, true) => {}
            (None, false) => self.filters.push((field.to_string(), value)),
        }
        self.page = 1;

        Ok(self.change_since(&before))
    }

    /// Remove the predicate on `field`, whatever its kind
    ///
    /// Resets the page to 1 like `set_filter`.
    pub fn clear_filter(&mut self, schema: &TableSchema, field: &str) -> Result<StateChange> {
        schema.filter(field)?;
        let before = self.shape();
        self.filters.retain(|(f, _)| f != field);
        self.page = 1;
        Ok(self.change_since(&before))
    }

    /// Drop every predicate; resets the page to 1
    pub fn clear_all_filters(&mut self) -> StateChange {
        let before = self.shape();
        self.filters.clear();
        self.page = 1;
        self.change_since(&before)
    }

    /// Advance the tri-state of a boolean filter
    pub fn toggle_flag(&mut self, schema: &TableSchema, field: &str) -> Result<StateChange> {
        let filter = schema.filter(field)?;
        if !matches!(filter.kind, FilterKind::Boolean { .. }) {
            return Err(Error::invalid_input(format!(
                "{}.{} is not a boolean filter",
                schema.screen, field
            )));
        }

        match TriState::from_value(self.filter(field)).cycle().to_value() {
            Some(value) => self.set_filter(schema, field, value),
            None => self.clear_filter(schema, field),
        }
    }

    // ---- sort ----

    /// Cycle `field` through none → ascending → descending → none
    ///
    /// The touched key moves to the end of the ordering; other keys keep
    /// their position and direction.
    pub fn toggle_sort(&mut self, schema: &TableSchema, field: &str) -> Result<StateChange> {
        let next = match self.sort.iter().find(|k| k.field == field) {
            None => Some(SortDirection::Ascending),
            Some(key) if !key.descending => Some(SortDirection::Descending),
            Some(_) => None,
        };
        self.set_sort(schema, field, next)
    }

    /// Set or remove the direction of `field`; resets the page to 1
    pub fn set_sort(
        &mut self,
        schema: &TableSchema,
        field: &str,
        direction: Option<SortDirection>,
    ) -> Result<StateChange> {
        schema.require_column(field)?;
        if !schema.is_sortable(field) {
            return Err(Error::invalid_input(format!(
                "{}.{} is not sortable",
                schema.screen, field
            )));
        }

        let before = self.shape();
        self.sort.retain(|k| k.field != field);
        if let Some(direction) = direction {
            self.sort.push(SortKey {
                field: field.to_string(),
                descending: direction == SortDirection::Descending,
            });
        }
        self.page = 1;

        Ok(self.change_since(&before))
    }

    // ---- paging ----

    /// Change the page size; resets the page to 1
    pub fn set_page_size(&mut self, schema: &TableSchema, size: u32) -> Result<StateChange> {
        if !schema.allows_page_size(size) {
            return Err(Error::invalid_input(format!(
                "Page size {} not allowed on {} (allowed: {:?})",
                size, schema.screen, schema.page_size_options
            )));
        }
        let before = self.shape();
        self.page_size = size;
        self.page = 1;
        Ok(self.change_since(&before))
    }

    /// Jump to page `page` (1-based, no upper bound)
    pub fn set_page(&mut self, page: u32) -> Result<StateChange> {
        if page == 0 {
            return Err(Error::invalid_input("Pages are numbered from 1"));
        }
        let before = self.shape();
        self.page = page;
        Ok(self.change_since(&before))
    }

    // ---- columns ----

    /// Show or hide a column
    pub fn set_column_visibility(
        &mut self,
        schema: &TableSchema,
        field: &str,
        visible: bool,
    ) -> Result<StateChange> {
        let column = schema.require_column(field)?;
        if !visible && !column.hideable {
            return Err(Error::invalid_input(format!(
                "{}.{} cannot be hidden",
                schema.screen, field
            )));
        }

        match self.column_visibility.insert(field.to_string(), visible) {
            Some(previous) if previous == visible => Ok(StateChange::NONE),
            _ => Ok(StateChange::COLUMNS),
        }
    }

    // ---- selection ----

    /// Flip one row in or out of the selection
    pub fn toggle_row_selection(&mut self, id: &str) -> StateChange {
        if !self.selection.remove(id) {
            self.selection.insert(id.to_string());
        }
        StateChange::NONE
    }

    /// Turn "select every matching row" on or off
    ///
    /// Turning it on needs a refetch: accumulation becomes unbounded from
    /// page 1. Turning it off also clears the explicit selection.
    pub fn select_all(&mut self, on: bool) -> StateChange {
        if on == self.select_all {
            return StateChange::NONE;
        }
        self.select_all = on;
        if on {
            StateChange {
                refetch: true,
                ..StateChange::NONE
            }
        } else {
            self.selection.clear();
            StateChange::NONE
        }
    }

    /// Replace select-all with an explicit selection of `ids`
    ///
    /// Used when the operator deselects one row out of a select-all.
    pub fn materialize_selection<I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.select_all = false;
        self.selection = ids.into_iter().collect();
    }

    /// Clear every selection
    pub fn reset_selection(&mut self) -> StateChange {
        self.selection.clear();
        self.select_all = false;
        StateChange::NONE
    }

    // ---- advanced search ----

    /// Add a token, replacing one with the same id in place
    pub fn add_advanced_filter(&mut self, id: &str, display: &str) -> StateChange {
        let before = self.shape();
        let token = AdvancedToken {
            id: id.to_string(),
            display: display.to_string(),
        };
        match self.advanced_filters.iter_mut().find(|t| t.id == id) {
            Some(slot) => *slot = token,
            None => self.advanced_filters.push(token),
        }
        self.page = 1;
        self.change_since(&before)
    }

    /// Remove the token with `id`
    pub fn remove_advanced_filter(&mut self, id: &str) -> StateChange {
        let before = self.shape();
        self.advanced_filters.retain(|t| t.id != id);
        self.page = 1;
        self.change_since(&before)
    }

    // ---- scope ----

    /// Replace the fixed base parameters of this screen instance
    ///
    /// A different scope means a different row identity set, so the
    /// selection is cleared.
    pub fn set_scope(&mut self, params: Vec<(String, String)>) -> StateChange {
        if params == self.scope {
            return StateChange::NONE;
        }
        debug!("Scope changed: {:?} -> {:?}", self.scope, params);
        self.scope = params;
        self.selection.clear();
        self.select_all = false;
        self.page = 1;
        StateChange {
            refetch: true,
            ..StateChange::NONE
        }
    }

    /// Apply a quick filter; applying the active one again turns it off
    pub fn apply_quick_filter(&mut self, quick: QuickFilter) -> StateChange {
        let before = self.shape();
        if self.quick_filter.as_ref().is_some_and(|q| q.label == quick.label) {
            self.quick_filter = None;
        } else {
            self.quick_filter = Some(quick);
        }
        self.page = 1;
        self.change_since(&before)
    }

    /// Turn off the active quick filter
    pub fn clear_quick_filter(&mut self) -> StateChange {
        let before = self.shape();
        self.quick_filter = None;
        self.page = 1;
        self.change_since(&before)
    }

    // ---- persistence ----

    /// Snapshot of the persisted part of the query
    pub fn to_persisted(&self) -> PersistedQuery {
        PersistedQuery {
            version: PERSISTED_QUERY_VERSION,
            filters: self
                .filters
                .iter()
                .map(|(field, value)| PersistedFilter {
                    field: field.clone(),
                    value: value.clone(),
                })
                .collect(),
            sort: self.sort.clone(),
            page: self.page,
            page_size: self.page_size,
            advanced_filters: self.advanced_filters.clone(),
        }
    }

    /// Restore a persisted query, dropping whatever no longer fits the schema
    pub fn restore_query(&mut self, schema: &TableSchema, persisted: PersistedQuery) {
        self.filters.clear();
        for PersistedFilter { field, value } in persisted.filters {
            if schema.check_value(&field, &value).is_err() || value.is_empty() {
                debug!("Dropping persisted filter on {}.{}", schema.screen, field);
                continue;
            }
            if self.filter(&field).is_none() {
                self.filters.push((field, value));
            }
        }

        self.sort.clear();
        for key in persisted.sort {
            if schema.is_sortable(&key.field) && !self.sort.iter().any(|k| k.field == key.field) {
                self.sort.push(key);
            } else {
                debug!("Dropping persisted sort on {}.{}", schema.screen, key.field);
            }
        }

        self.page_size = if schema.allows_page_size(persisted.page_size) {
            persisted.page_size
        } else {
            schema.default_page_size
        };
        self.page = persisted.page.max(1);
        self.advanced_filters = persisted.advanced_filters;
    }

    /// Restore persisted column visibility over the schema defaults
    pub fn restore_columns(&mut self, schema: &TableSchema, persisted: BTreeMap<String, bool>) {
        for (field, visible) in persisted {
            match schema.column(&field) {
                Some(column) if visible || column.hideable => {
                    self.column_visibility.insert(field, visible);
                }
                _ => debug!("Dropping persisted visibility of {}.{}", schema.screen, field),
            }
        }
    }
}
