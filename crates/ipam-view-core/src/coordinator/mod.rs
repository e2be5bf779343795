//! Paged fetch coordinator
//!
//! The FetchCoordinator is responsible for:
//! - Running list requests against the ListSource off the owner's task
//! - Accumulating prefetch pages strictly in page order
//! - Keeping the last good row set visible while a new fetch is in flight
//! - Discarding outcomes of superseded requests
//!
//! ## Architecture
//!
//! ```text
//!  owner (controller)                 spawned generation task
//! ┌──────────────────┐  refresh()   ┌─────────────────────────┐
//! │ FetchCoordinator │ ───────────▶ │ fetch page N            │
//! │                  │              │ apply if generation     │
//! │  snapshot() ◀────┼── shared ────┤   is still current      │
//! │                  │   state      │ fetch page N+1 (opt.)   │
//! └──────────────────┘              └─────────────────────────┘
//!          │                                    │
//!          ▼                                    ▼
//!    ViewEvent channel  ◀───────────────────────┘
//! ```
//!
//! ## Generations
//!
//! Every `refresh()` increments the generation. A task only writes visible
//! state while its generation is current and the page it carries is the one
//! the state expects next; anything else is dropped with a debug log and a
//! [`ViewEvent::StaleDiscarded`]. Superseded tasks are left to finish and are
//! discarded on arrival; `cancel()` aborts every task outright.
//!
//! ## Visible State
//!
//! The current row set stays visible until the first page of a newer
//! generation replaces it. The set it replaced is kept as `previous`.
//! Prefetch continuation pages append to the current set.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::request::PAGE_PARAM;
use crate::traits::{ListRequest, ListSource, PageResult, Row};

/// Page bound of auto-prefetch screens when nothing else is configured
pub const DEFAULT_PREFETCH_PAGES: u32 = 3;

/// Paging policy of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// One page per request; the result replaces the visible set
    #[default]
    SinglePage,

    /// After the first page, keep requesting pages while `has_next` holds,
    /// up to `max_pages` pages in total (`None`: unbounded)
    Prefetch { max_pages: Option<u32> },
}

impl FetchMode {
    /// Prefetch with the default bound
    pub fn prefetch() -> Self {
        FetchMode::Prefetch {
            max_pages: Some(DEFAULT_PREFETCH_PAGES),
        }
    }

    /// Total pages one generation may load
    ///
    /// "Select all" lifts every bound so every matching row gets loaded.
    pub fn page_limit(&self, select_all: bool) -> Option<u32> {
        if select_all {
            return None;
        }
        match self {
            FetchMode::SinglePage => Some(1),
            FetchMode::Prefetch { max_pages } => *max_pages,
        }
    }

    /// Same mode with a different prefetch bound (no-op for single page)
    pub fn with_prefetch_bound(self, bound: Option<u32>) -> Self {
        match self {
            FetchMode::SinglePage => FetchMode::SinglePage,
            FetchMode::Prefetch { .. } => FetchMode::Prefetch { max_pages: bound },
        }
    }
}

/// Fetch status exposed to the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchStatus {
    /// Nothing requested yet
    #[default]
    Idle,
    /// First page of the current generation in flight
    Loading,
    /// Continuation pages in flight
    Prefetching,
    /// Current generation fully loaded
    Ready,
    /// Last fetch failed; previous rows are still visible
    Failed(String),
}

impl FetchStatus {
    /// Whether a request is outstanding
    pub fn is_busy(&self) -> bool {
        matches!(self, FetchStatus::Loading | FetchStatus::Prefetching)
    }
}

/// Events emitted by the FetchCoordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// A new generation started
    FetchStarted { generation: u64, page: u32 },

    /// A page was applied to the visible set
    PageLoaded {
        generation: u64,
        page: u32,
        rows: usize,
        total_count: u64,
        has_more: bool,
    },

    /// The first page of a generation replaced the visible set
    RowsReplaced { generation: u64, rows: usize },

    /// A fetch of the current generation failed
    FetchFailed { generation: u64, error: String },

    /// An outcome of a superseded generation arrived and was dropped
    StaleDiscarded { generation: u64, page: u32 },

    /// In-flight work was cancelled
    Cancelled { generation: u64 },
}

/// Point-in-time copy of the visible state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewSnapshot {
    /// Current generation
    pub generation: u64,
    /// Fetch status
    pub status: FetchStatus,
    /// Visible rows (last good set)
    pub rows: Vec<Row>,
    /// Total matching rows reported by the backend
    pub total_count: u64,
    /// Whether the backend reported more pages
    pub has_next: bool,
    /// Pages accumulated into `rows`
    pub pages_loaded: u32,
    /// Loading with nothing to show yet
    pub initial_load: bool,
}

impl ViewSnapshot {
    /// "Loaded X of Y rows"
    pub fn summary(&self) -> String {
        format!("Loaded {} of {} rows", self.rows.len(), self.total_count)
    }
}

#[derive(Debug, Clone)]
struct RowSet {
    generation: u64,
    rows: Vec<Row>,
    total_count: u64,
    has_next: bool,
    pages_loaded: u32,
}

#[derive(Debug, Default)]
struct FetchState {
    generation: u64,
    status: FetchStatus,
    current: Option<RowSet>,
    previous: Option<RowSet>,
    /// Page the current generation expects next
    next_page: Option<u32>,
    /// Whether the current generation already replaced the visible set
    replaced: bool,
}

enum Applied {
    Replaced,
    Appended,
    Stale,
}

fn lock(shared: &Mutex<FetchState>) -> MutexGuard<'_, FetchState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn emit_event(events: &mpsc::Sender<ViewEvent>, event: ViewEvent) {
    // Full channel: drop the event rather than block the fetch path
    if events.try_send(event).is_err() {
        warn!(
            "View event channel full, dropping event. \
             Consider increasing event_channel_capacity."
        );
    }
}

/// Paged fetch coordinator for one table
///
/// ## Lifecycle
///
/// 1. Create with [`FetchCoordinator::new()`]
/// 2. Call [`FetchCoordinator::refresh()`] on every query change
/// 3. Read [`FetchCoordinator::snapshot()`] or consume the event receiver
/// 4. [`FetchCoordinator::cancel()`] or drop on screen close; in-flight
///    tasks are aborted either way
///
/// Requires a Tokio runtime: fetches run as spawned tasks.
pub struct FetchCoordinator {
    /// Remote list collaborator
    source: Arc<dyn ListSource>,

    /// Visible state shared with generation tasks
    shared: Arc<Mutex<FetchState>>,

    /// In-flight generation tasks
    tasks: JoinSet<()>,

    /// Event sender for the rendering layer
    event_tx: mpsc::Sender<ViewEvent>,
}

impl FetchCoordinator {
    /// Create a coordinator
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver)
    pub fn new(
        source: Arc<dyn ListSource>,
        event_channel_capacity: usize,
    ) -> (Self, mpsc::Receiver<ViewEvent>) {
        let (tx, rx) = mpsc::channel(event_channel_capacity.max(1));

        let coordinator = Self {
            source,
            shared: Arc::new(Mutex::new(FetchState::default())),
            tasks: JoinSet::new(),
            event_tx: tx,
        };

        (coordinator, rx)
    }

    /// Start a new generation for `request`
    ///
    /// With `select_all` the generation starts at page 1 and loads every
    /// page; otherwise `mode` bounds the number of pages.
    ///
    /// # Returns
    ///
    /// The new generation number
    pub fn refresh(&mut self, mut request: ListRequest, mode: FetchMode, select_all: bool) -> u64 {
        self.reap_finished();

        if select_all {
            request.set(PAGE_PARAM, "1");
        }
        let first_page = request.page();
        let max_pages = mode.page_limit(select_all);

        let generation = {
            let mut state = lock(&self.shared);
            state.generation += 1;
            state.status = FetchStatus::Loading;
            state.next_page = Some(first_page);
            state.replaced = false;
            state.generation
        };

        debug!(
            "Generation {} for {} starting at page {} (page limit: {:?})",
            generation, request.endpoint, first_page, max_pages
        );
        emit_event(
            &self.event_tx,
            ViewEvent::FetchStarted {
                generation,
                page: first_page,
            },
        );

        let task = GenerationTask {
            generation,
            request,
            max_pages,
            source: self.source.clone(),
            shared: self.shared.clone(),
            events: self.event_tx.clone(),
        };
        self.tasks.spawn(task.run());

        generation
    }

    /// Abort in-flight fetches and stop prefetch continuation
    ///
    /// Visible rows are kept.
    pub fn cancel(&mut self) {
        self.tasks.abort_all();

        let cancelled = {
            let mut state = lock(&self.shared);
            let cancelled = state.generation;
            state.generation += 1;
            state.next_page = None;
            if state.status.is_busy() {
                state.status = if state.current.is_some() {
                    FetchStatus::Ready
                } else {
                    FetchStatus::Idle
                };
            }
            cancelled
        };

        debug!("Cancelled generation {}", cancelled);
        emit_event(
            &self.event_tx,
            ViewEvent::Cancelled {
                generation: cancelled,
            },
        );
    }

    /// Cancel and forget every row set, as if newly created
    pub fn reset(&mut self) {
        self.cancel();
        let mut state = lock(&self.shared);
        state.current = None;
        state.previous = None;
        state.status = FetchStatus::Idle;
    }

    /// Wait until every spawned task has finished
    pub async fn wait_idle(&mut self) {
        while let Some(outcome) = self.tasks.join_next().await {
            if let Err(e) = outcome {
                if e.is_panic() {
                    error!("Fetch task panicked: {}", e);
                }
            }
        }
    }

    fn reap_finished(&mut self) {
        while let Some(outcome) = self.tasks.try_join_next() {
            if let Err(e) = outcome {
                if e.is_panic() {
                    error!("Fetch task panicked: {}", e);
                }
            }
        }
    }

    /// Copy of the visible state
    pub fn snapshot(&self) -> ViewSnapshot {
        let state = lock(&self.shared);
        let (rows, total_count, has_next, pages_loaded) = match &state.current {
            Some(set) => (set.rows.clone(), set.total_count, set.has_next, set.pages_loaded),
            None => (Vec::new(), 0, false, 0),
        };

        ViewSnapshot {
            generation: state.generation,
            initial_load: state.status == FetchStatus::Loading && state.current.is_none(),
            status: state.status.clone(),
            rows,
            total_count,
            has_next,
            pages_loaded,
        }
    }

    /// Visible rows
    pub fn rows(&self) -> Vec<Row> {
        lock(&self.shared)
            .current
            .as_ref()
            .map(|set| set.rows.clone())
            .unwrap_or_default()
    }

    /// The row set replaced by the current one
    pub fn previous_rows(&self) -> Vec<Row> {
        lock(&self.shared)
            .previous
            .as_ref()
            .map(|set| set.rows.clone())
            .unwrap_or_default()
    }

    /// Current status
    pub fn status(&self) -> FetchStatus {
        lock(&self.shared).status.clone()
    }

    /// Current generation number
    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Loading with no prior result
    pub fn initial_load(&self) -> bool {
        let state = lock(&self.shared);
        state.status == FetchStatus::Loading && state.current.is_none()
    }

    /// "Loaded X of Y rows"
    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    /// Generation the visible rows came from
    pub fn rows_generation(&self) -> Option<u64> {
        lock(&self.shared).current.as_ref().map(|set| set.generation)
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("source", &self.source.source_name())
            .field("generation", &self.generation())
            .field("status", &self.status())
            .finish()
    }
}

/// One generation's sequential page loop
struct GenerationTask {
    generation: u64,
    request: ListRequest,
    max_pages: Option<u32>,
    source: Arc<dyn ListSource>,
    shared: Arc<Mutex<FetchState>>,
    events: mpsc::Sender<ViewEvent>,
}

impl GenerationTask {
    async fn run(mut self) {
        let mut loaded = 0u32;

        loop {
            let page = self.request.page();

            let result = match self.source.fetch_page(&self.request).await {
                Ok(result) => result,
                Err(e) => {
                    self.fail(page, &e);
                    return;
                }
            };

            loaded += 1;
            // u32::MAX is the last addressable page
            let next_page = page.checked_add(1);
            let more = result.has_next
                && next_page.is_some()
                && self.max_pages.is_none_or(|max| loaded < max);
            let rows = result.items.len();
            let total_count = result.total_count;

            match self.apply(page, result, more) {
                Applied::Replaced => {
                    emit_event(
                        &self.events,
                        ViewEvent::RowsReplaced {
                            generation: self.generation,
                            rows,
                        },
                    );
                }
                Applied::Appended => {}
                Applied::Stale => {
                    debug!(
                        "Discarding page {} of superseded generation {}",
                        page, self.generation
                    );
                    emit_event(
                        &self.events,
                        ViewEvent::StaleDiscarded {
                            generation: self.generation,
                            page,
                        },
                    );
                    return;
                }
            }

            emit_event(
                &self.events,
                ViewEvent::PageLoaded {
                    generation: self.generation,
                    page,
                    rows,
                    total_count,
                    has_more: more,
                },
            );

            if !more {
                info!(
                    "Loaded {} page(s) from {} (generation {}, {} total rows)",
                    loaded, self.request.endpoint, self.generation, total_count
                );
                return;
            }

            // Next page only after this one is accumulated
            if let Some(next) = next_page {
                self.request.set(PAGE_PARAM, next.to_string());
            }
        }
    }

    fn apply(&self, page: u32, result: PageResult, more: bool) -> Applied {
        let mut state = lock(&self.shared);
        if state.generation != self.generation || state.next_page != Some(page) {
            return Applied::Stale;
        }

        state.next_page = if more { page.checked_add(1) } else { None };
        state.status = if more {
            FetchStatus::Prefetching
        } else {
            FetchStatus::Ready
        };

        if !state.replaced {
            state.replaced = true;
            let fresh = RowSet {
                generation: self.generation,
                rows: result.items,
                total_count: result.total_count,
                has_next: result.has_next,
                pages_loaded: 1,
            };
            state.previous = state.current.replace(fresh);
            return Applied::Replaced;
        }

        match state.current.as_mut() {
            Some(set) => {
                set.rows.extend(result.items);
                set.total_count = result.total_count;
                set.has_next = result.has_next;
                set.pages_loaded += 1;
            }
            None => {
                state.current = Some(RowSet {
                    generation: self.generation,
                    rows: result.items,
                    total_count: result.total_count,
                    has_next: result.has_next,
                    pages_loaded: 1,
                });
            }
        }
        Applied::Appended
    }

    fn fail(&self, page: u32, err: &Error) {
        let message = err.to_string();
        let current = {
            let mut state = lock(&self.shared);
            let current = state.generation == self.generation;
            if current {
                state.status = FetchStatus::Failed(message.clone());
                state.next_page = None;
            }
            current
        };

        if current {
            if err.is_remote() {
                warn!(
                    "Fetch of {} page {} failed: {}",
                    self.request.endpoint, page, message
                );
            } else {
                error!(
                    "Fetch of {} page {} failed: {}",
                    self.request.endpoint, page, message
                );
            }
            emit_event(
                &self.events,
                ViewEvent::FetchFailed {
                    generation: self.generation,
                    error: message,
                },
            );
        } else {
            debug!(
                "Discarding failure of superseded generation {}: {}",
                self.generation, message
            );
            emit_event(
                &self.events,
                ViewEvent::StaleDiscarded {
                    generation: self.generation,
                    page,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `pages` pages of two rows each; fails on page `fail_on`
    struct PagedSource {
        pages: u32,
        fail_on: Option<u32>,
        calls: AtomicUsize,
    }

    impl PagedSource {
        fn new(pages: u32) -> Self {
            Self {
                pages,
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ListSource for PagedSource {
        async fn fetch_page(&self, request: &ListRequest) -> crate::Result<PageResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let page = request.page();
            if self.fail_on == Some(page) {
                return Err(crate::Error::http("502 Bad Gateway"));
            }
            if page > self.pages {
                return Ok(PageResult {
                    items: Vec::new(),
                    total_count: u64::from(self.pages) * 2,
                    has_next: false,
                });
            }
            Ok(PageResult {
                items: vec![
                    Row::new(json!({ "id": page * 10 + 1 })),
                    Row::new(json!({ "id": page * 10 + 2 })),
                ],
                total_count: u64::from(self.pages) * 2,
                has_next: page < self.pages,
            })
        }

        fn source_name(&self) -> &'static str {
            "paged"
        }
    }

    fn ids(rows: &[Row]) -> Vec<String> {
        rows.iter().filter_map(|r| r.key("id")).collect()
    }

    #[test]
    fn test_page_limits() {
        assert_eq!(FetchMode::SinglePage.page_limit(false), Some(1));
        assert_eq!(FetchMode::prefetch().page_limit(false), Some(3));
        assert_eq!(FetchMode::prefetch().page_limit(true), None);
        assert_eq!(FetchMode::SinglePage.page_limit(true), None);
        assert_eq!(
            FetchMode::prefetch().with_prefetch_bound(Some(1)),
            FetchMode::Prefetch { max_pages: Some(1) }
        );
    }

    #[tokio::test]
    async fn test_single_page_replaces_rows() {
        let source = Arc::new(PagedSource::new(5));
        let (mut coordinator, _rx) = FetchCoordinator::new(source.clone(), 16);

        assert_eq!(coordinator.status(), FetchStatus::Idle);
        coordinator.refresh(
            ListRequest::new("dns/").with_param("page", "2"),
            FetchMode::SinglePage,
            false,
        );
        assert!(coordinator.initial_load());
        coordinator.wait_idle().await;

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.status, FetchStatus::Ready);
        assert_eq!(ids(&snapshot.rows), vec!["21", "22"]);
        assert_eq!(snapshot.summary(), "Loaded 2 of 10 rows");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_prefetch_stops_at_bound() {
        let source = Arc::new(PagedSource::new(5));
        let (mut coordinator, _rx) = FetchCoordinator::new(source.clone(), 16);

        coordinator.refresh(ListRequest::new("domains/"), FetchMode::prefetch(), false);
        coordinator.wait_idle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(ids(&coordinator.rows()), vec!["11", "12", "21", "22", "31", "32"]);
        assert!(coordinator.snapshot().has_next);
    }

    #[tokio::test]
    async fn test_select_all_loads_everything_from_first_page() {
        let source = Arc::new(PagedSource::new(5));
        let (mut coordinator, _rx) = FetchCoordinator::new(source.clone(), 16);

        let request = ListRequest::new("hosts/").with_param("page", "4");
        coordinator.refresh(request, FetchMode::SinglePage, true);
        coordinator.wait_idle().await;

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.rows.len(), 10);
        assert_eq!(snapshot.pages_loaded, 5);
        assert!(!snapshot.has_next);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_rows() {
        let source = Arc::new(PagedSource {
            pages: 5,
            fail_on: Some(2),
            calls: AtomicUsize::new(0),
        });
        let (mut coordinator, mut rx) = FetchCoordinator::new(source, 16);

        coordinator.refresh(ListRequest::new("dns/"), FetchMode::SinglePage, false);
        coordinator.wait_idle().await;
        coordinator.refresh(
            ListRequest::new("dns/").with_param("page", "2"),
            FetchMode::SinglePage,
            false,
        );
        coordinator.wait_idle().await;

        assert!(matches!(coordinator.status(), FetchStatus::Failed(_)));
        assert_eq!(ids(&coordinator.rows()), vec!["11", "12"]);

        let mut saw_failure = false;
        while let Ok(event) = rx.try_recv() {
            saw_failure |= matches!(event, ViewEvent::FetchFailed { generation: 2, .. });
        }
        assert!(saw_failure);
    }

    /// Always claims another page exists
    struct EndlessSource;

    #[async_trait]
    impl ListSource for EndlessSource {
        async fn fetch_page(&self, request: &ListRequest) -> crate::Result<PageResult> {
            Ok(PageResult {
                items: vec![Row::new(json!({ "id": request.page() }))],
                total_count: u64::MAX,
                has_next: true,
            })
        }

        fn source_name(&self) -> &'static str {
            "endless"
        }
    }

    #[tokio::test]
    async fn test_last_addressable_page_finishes_ready() {
        let (mut coordinator, mut rx) = FetchCoordinator::new(Arc::new(EndlessSource), 16);
        let last = u32::MAX.to_string();

        let generation = coordinator.refresh(
            ListRequest::new("hosts/").with_param("page", last.as_str()),
            FetchMode::prefetch(),
            false,
        );
        coordinator.wait_idle().await;

        assert_eq!(coordinator.status(), FetchStatus::Ready);
        assert_eq!(ids(&coordinator.rows()), vec![last.clone()]);

        let mut loaded = None;
        while let Ok(event) = rx.try_recv() {
            if let ViewEvent::PageLoaded { page, has_more, .. } = event {
                loaded = Some((page, has_more));
            }
        }
        assert_eq!(loaded, Some((u32::MAX, false)));
        assert_eq!(coordinator.generation(), generation);
    }

    #[tokio::test]
    async fn test_reset_clears_rows() {
        let source = Arc::new(PagedSource::new(1));
        let (mut coordinator, _rx) = FetchCoordinator::new(source, 16);

        coordinator.refresh(ListRequest::new("users/"), FetchMode::SinglePage, false);
        coordinator.wait_idle().await;
        assert_eq!(coordinator.rows().len(), 2);

        coordinator.reset();
        assert!(coordinator.rows().is_empty());
        assert_eq!(coordinator.status(), FetchStatus::Idle);
    }
}
