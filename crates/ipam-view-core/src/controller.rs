//! View controller
//!
//! One [`ViewController`] per open screen. It owns the query state, the
//! screen's schema and a fetch coordinator, and wires them to the
//! collaborators:
//!
//! ```text
//!  operator action
//!        │
//!        ▼
//!  QueryState mutation ──▶ StateChange
//!        │                    │
//!        │          ┌─────────┴──────────┐
//!        │          ▼                    ▼
//!        │   KeyValueStore.set     derive_request
//!        │   (errors swallowed)          │
//!        │                               ▼
//!        │                     FetchCoordinator.refresh
//!        │                               │
//!        ▼                               ▼
//!   snapshot() / selected_rows()    ViewEvent stream
//! ```
//!
//! Persisted state is read once in [`ViewController::open`] and written on
//! every change, awaited in mutation order.

use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ViewConfig;
use crate::coordinator::{FetchCoordinator, FetchMode, FetchStatus, ViewEvent, ViewSnapshot};
use crate::descriptor::{AddressTypeTable, ColumnDescriptor, SerializeContext, TableSchema};
use crate::error::{Error, Result};
use crate::query::persisted::{decode_columns, encode_columns};
use crate::query::{
    FilterValue, PersistedQuery, QueryState, QuickFilter, SortDirection, StateChange,
};
use crate::request::derive_request;
use crate::traits::{KeyValueStore, ListRequest, LookupSource, Row, SourceHandle};

/// Controller of one open screen
pub struct ViewController {
    schema: TableSchema,
    state: QueryState,
    coordinator: FetchCoordinator,
    fetch_mode: FetchMode,
    lookup: Arc<dyn LookupSource>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    address_types: Option<AddressTypeTable>,
    events: Option<ReceiverStream<ViewEvent>>,
}

impl ViewController {
    /// Open a screen
    ///
    /// Applies the view settings to the schema, then restores the persisted
    /// column layout (and, where the schema opts in, the persisted query).
    /// No fetch is started; call [`ViewController::refresh`].
    pub async fn open(
        schema: TableSchema,
        sources: SourceHandle,
        store: Arc<dyn KeyValueStore>,
        config: &ViewConfig,
    ) -> Result<Self> {
        config.validate()?;

        let schema = schema.with_page_size_options(&config.page_size_options);
        let fetch_mode = schema
            .fetch_mode
            .with_prefetch_bound(config.prefetch_max_pages);
        let mut state = QueryState::new(&schema);

        let columns_key = PersistedQuery::columns_key(&schema.screen);
        match store.get(&columns_key).await {
            Ok(Some(raw)) => {
                if let Some(columns) = decode_columns(&raw) {
                    state.restore_columns(&schema, columns);
                }
            }
            Ok(None) => debug!("No persisted column layout for {}", schema.screen),
            Err(e) => warn!("Failed to read {}: {}", columns_key, e),
        }

        if schema.persist_query {
            let query_key = PersistedQuery::key(&schema.screen);
            match store.get(&query_key).await {
                Ok(Some(raw)) => {
                    if let Some(persisted) = PersistedQuery::decode(&raw) {
                        state.restore_query(&schema, persisted);
                    }
                }
                Ok(None) => debug!("No persisted query for {}", schema.screen),
                Err(e) => warn!("Failed to read {}: {}", query_key, e),
            }
        }

        let (coordinator, event_rx) =
            FetchCoordinator::new(sources.list.clone(), config.event_channel_capacity);

        info!(
            "Opened {} ({}, {} columns, page size {})",
            schema.screen,
            schema.endpoint,
            schema.columns.len(),
            state.page_size()
        );

        Ok(Self {
            schema,
            state,
            coordinator,
            fetch_mode,
            lookup: sources.lookup,
            store,
            clock: Arc::new(SystemClock),
            address_types: None,
            events: Some(ReceiverStream::new(event_rx)),
        })
    }

    /// Replace the clock used for relative filters
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Take the view event stream (available once)
    pub fn take_events(&mut self) -> Option<ReceiverStream<ViewEvent>> {
        self.events.take()
    }

    // ---- reads ----

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    /// Effective paging policy
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.coordinator.snapshot()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.coordinator.rows()
    }

    pub fn status(&self) -> FetchStatus {
        self.coordinator.status()
    }

    /// "Loaded X of Y rows"
    pub fn summary(&self) -> String {
        self.coordinator.summary()
    }

    /// Columns currently shown, in display order
    pub fn visible_columns(&self) -> Vec<&ColumnDescriptor> {
        self.schema
            .columns
            .iter()
            .filter(|c| self.state.is_column_visible(&c.id))
            .collect()
    }

    /// Selected rows among the visible set, for bulk-action collaborators
    pub fn selected_rows(&self) -> Vec<Row> {
        let key_field = &self.schema.key_field;
        self.coordinator
            .rows()
            .into_iter()
            .filter(|row| {
                row.key(key_field)
                    .is_some_and(|key| self.state.is_selected(&key))
            })
            .collect()
    }

    /// Request the current state maps to
    pub fn current_request(&self) -> ListRequest {
        let empty = AddressTypeTable::default();
        let ctx = SerializeContext {
            now: self.clock.now(),
            address_types: self.address_types.as_ref().unwrap_or(&empty),
        };
        derive_request(&self.schema, &self.state, &ctx)
    }

    // ---- fetching ----

    /// Start a fetch for the current state
    ///
    /// Also the explicit retry after a failure.
    pub async fn refresh(&mut self) -> u64 {
        self.ensure_address_types().await;
        let request = self.current_request();
        self.coordinator
            .refresh(request, self.fetch_mode, self.state.select_all_active())
    }

    /// Wait for in-flight fetches to finish
    pub async fn wait_idle(&mut self) {
        self.coordinator.wait_idle().await;
    }

    /// Cancel in-flight work and flush the store
    pub async fn close(&mut self) {
        self.coordinator.cancel();
        if let Err(e) = self.store.flush().await {
            warn!("Failed to flush view store for {}: {}", self.schema.screen, e);
        }
        info!("Closed {}", self.schema.screen);
    }

    /// Fill the options of an exact-match filter from its lookup endpoint
    ///
    /// # Returns
    ///
    /// The number of options loaded; the previous options stay on failure.
    pub async fn load_options(&mut self, field: &str) -> Result<usize> {
        let endpoint = self
            .schema
            .filter(field)?
            .options_endpoint
            .clone()
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "{}.{} has no options endpoint",
                    self.schema.screen, field
                ))
            })?;

        let entries = self.lookup.fetch_lookup(&endpoint).await?;
        let options: Vec<String> = entries.into_iter().map(|e| e.name).collect();
        let count = options.len();
        self.schema.set_options(field, options)?;

        debug!("Loaded {} options for {}.{}", count, self.schema.screen, field);
        Ok(count)
    }

    async fn ensure_address_types(&mut self) {
        if self.address_types.is_some() {
            return;
        }
        let needed = self.state.filters().iter().any(|(_, value)| {
            matches!(value, FilterValue::AddressType(_))
        });
        let Some(endpoint) = self.schema.lookup_endpoint.as_deref() else {
            return;
        };
        if !needed {
            return;
        }

        match self.lookup.fetch_lookup(endpoint).await {
            Ok(entries) => {
                let table = AddressTypeTable::from_entries(entries);
                debug!("Loaded {} address types", table.len());
                self.address_types = Some(table);
            }
            // Unresolved names go out as typed
            Err(e) => warn!("Failed to load address types from {}: {}", endpoint, e),
        }
    }

    // ---- mutations ----

    async fn apply(&mut self, change: StateChange) {
        if change.persist_columns {
            self.persist_columns().await;
        }
        if change.persist_query && self.schema.persist_query {
            self.persist_query().await;
        }
        if change.refetch {
            self.refresh().await;
        }
    }

    async fn persist_columns(&self) {
        let key = PersistedQuery::columns_key(&self.schema.screen);
        let outcome = match encode_columns(self.state.column_visibility()) {
            Ok(raw) => self.store.set(&key, &raw).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!("Failed to persist {}: {}", key, e);
        }
    }

    async fn persist_query(&self) {
        let key = PersistedQuery::key(&self.schema.screen);
        let outcome = match self.state.to_persisted().encode() {
            Ok(raw) => self.store.set(&key, &raw).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            warn!("Failed to persist {}: {}", key, e);
        }
    }

    /// Apply several mutations with one round of persistence and at most
    /// one fetch
    ///
    /// `mutate` works on a copy; on error the state is left untouched.
    pub async fn batch<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&TableSchema, &mut QueryState) -> Result<StateChange>,
    {
        let mut next = self.state.clone();
        let change = mutate(&self.schema, &mut next)?;
        self.state = next;
        self.apply(change).await;
        Ok(())
    }

    pub async fn set_filter(&mut self, field: &str, value: FilterValue) -> Result<()> {
        let change = self.state.set_filter(&self.schema, field, value)?;
        self.apply(change).await;
        Ok(())
    }

    /// Set a filter from operator text, parsed per the field's filter kind
    ///
    /// Blank text clears the filter.
    pub async fn set_filter_text(&mut self, field: &str, raw: &str) -> Result<()> {
        match self.schema.filter(field)?.parse_value(raw)? {
            Some(value) => self.set_filter(field, value).await,
            None => self.clear_filter(field).await,
        }
    }

    pub async fn clear_filter(&mut self, field: &str) -> Result<()> {
        let change = self.state.clear_filter(&self.schema, field)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn clear_all_filters(&mut self) {
        let change = self.state.clear_all_filters();
        self.apply(change).await;
    }

    pub async fn toggle_flag(&mut self, field: &str) -> Result<()> {
        let change = self.state.toggle_flag(&self.schema, field)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn toggle_sort(&mut self, field: &str) -> Result<()> {
        let change = self.state.toggle_sort(&self.schema, field)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn set_sort(&mut self, field: &str, direction: Option<SortDirection>) -> Result<()> {
        let change = self.state.set_sort(&self.schema, field, direction)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn set_page_size(&mut self, size: u32) -> Result<()> {
        let change = self.state.set_page_size(&self.schema, size)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn set_page(&mut self, page: u32) -> Result<()> {
        let change = self.state.set_page(page)?;
        self.apply(change).await;
        Ok(())
    }

    pub async fn set_column_visibility(&mut self, field: &str, visible: bool) -> Result<()> {
        let change = self
            .state
            .set_column_visibility(&self.schema, field, visible)?;
        self.apply(change).await;
        Ok(())
    }

    /// Flip one row; under select-all, the other visible rows stay selected
    pub fn toggle_row_selection(&mut self, id: &str) {
        if self.state.select_all_active() {
            let key_field = &self.schema.key_field;
            let visible = self
                .coordinator
                .rows()
                .iter()
                .filter_map(|row| row.key(key_field))
                .collect::<Vec<_>>();
            self.state.materialize_selection(visible);
        }
        self.state.toggle_row_selection(id);
    }

    /// Select every matching row (loads every page) or drop the selection
    pub async fn select_all(&mut self, on: bool) {
        let change = self.state.select_all(on);
        self.apply(change).await;
    }

    pub fn reset_selection(&mut self) {
        self.state.reset_selection();
    }

    pub async fn add_advanced_filter(&mut self, id: &str, display: &str) {
        let change = self.state.add_advanced_filter(id, display);
        self.apply(change).await;
    }

    pub async fn remove_advanced_filter(&mut self, id: &str) {
        let change = self.state.remove_advanced_filter(id);
        self.apply(change).await;
    }

    pub async fn set_scope(&mut self, params: Vec<(String, String)>) {
        let change = self.state.set_scope(params);
        self.apply(change).await;
    }

    pub async fn apply_quick_filter(&mut self, quick: QuickFilter) {
        let change = self.state.apply_quick_filter(quick);
        self.apply(change).await;
    }

    pub async fn clear_quick_filter(&mut self) {
        let change = self.state.clear_quick_filter();
        self.apply(change).await;
    }
}

impl std::fmt::Debug for ViewController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewController")
            .field("screen", &self.schema.screen)
            .field("state", &self.state)
            .field("coordinator", &self.coordinator)
            .finish()
    }
}
