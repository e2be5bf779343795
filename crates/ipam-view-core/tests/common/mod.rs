//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal collaborators that let the contract tests
//! control timing and observe calls without a real backend.

#![allow(dead_code)]

use async_trait::async_trait;
use ipam_view_core::error::{Error, Result};
use ipam_view_core::traits::{
    KeyValueStore, ListRequest, ListSource, LookupEntry, LookupSource, PageResult, Row,
    SourceHandle,
};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

type Responder = Arc<dyn Fn(&ListRequest) -> Result<PageResult> + Send + Sync>;

/// A ListSource whose responses are released by the test
///
/// Every `fetch_page` call is recorded in arrival order. When gated, the
/// call then waits until the test releases its index.
pub struct ControlledListSource {
    responder: Responder,
    gated: bool,
    requests: Arc<Mutex<Vec<ListRequest>>>,
    gates: Arc<Mutex<Vec<Option<oneshot::Sender<()>>>>>,
    /// Requests that returned (including ones whose result was discarded)
    completed: Arc<AtomicUsize>,
}

impl ControlledListSource {
    /// Source answering immediately
    pub fn immediate<F>(responder: F) -> Self
    where
        F: Fn(&ListRequest) -> Result<PageResult> + Send + Sync + 'static,
    {
        Self::build(Arc::new(responder), false)
    }

    /// Source holding every answer until [`ControlledListSource::release`]
    pub fn gated<F>(responder: F) -> Self
    where
        F: Fn(&ListRequest) -> Result<PageResult> + Send + Sync + 'static,
    {
        Self::build(Arc::new(responder), true)
    }

    fn build(responder: Responder, gated: bool) -> Self {
        Self {
            responder,
            gated,
            requests: Arc::new(Mutex::new(Vec::new())),
            gates: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let call number `index` (0-based, arrival order) answer
    pub fn release(&self, index: usize) {
        let sender = self
            .gates
            .lock()
            .unwrap()
            .get_mut(index)
            .and_then(Option::take);
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<ListRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received so far
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Number of requests that have returned
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` requests arrived (panics after 5 seconds)
    pub async fn wait_for_calls(&self, n: usize) {
        let deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while self.call_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(
            deadline.is_ok(),
            "expected {} requests, saw {}",
            n,
            self.call_count()
        );
    }

    /// Wait until at least `n` requests returned (panics after 5 seconds)
    pub async fn wait_for_completions(&self, n: usize) {
        let deadline = tokio::time::timeout(Duration::from_secs(5), async {
            while self.completed_count() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(deadline.is_ok(), "expected {} completed requests", n);
    }

    /// Create a new source that shares recordings and gates with this one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            responder: Arc::clone(&other.responder),
            gated: other.gated,
            requests: Arc::clone(&other.requests),
            gates: Arc::clone(&other.gates),
            completed: Arc::clone(&other.completed),
        }
    }
}

#[async_trait]
impl ListSource for ControlledListSource {
    async fn fetch_page(&self, request: &ListRequest) -> Result<PageResult> {
        let gate = {
            // Recording and gate registration share one critical section so
            // indices match arrival order
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            if self.gated {
                let (tx, rx) = oneshot::channel();
                self.gates.lock().unwrap().push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };

        if let Some(rx) = gate {
            let _ = rx.await;
        }

        let result = (self.responder)(request);
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A LookupSource serving fixed entries per endpoint
pub struct StaticLookupSource {
    entries: HashMap<String, Vec<LookupEntry>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl StaticLookupSource {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Serve `names` (ids 1, 2, ...) at `endpoint`
    pub fn with(mut self, endpoint: &str, names: &[&str]) -> Self {
        let entries = names
            .iter()
            .enumerate()
            .map(|(i, name)| LookupEntry {
                id: i as i64 + 1,
                name: name.to_string(),
            })
            .collect();
        self.entries.insert(endpoint.to_string(), entries);
        self
    }

    /// Make every lookup fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Create a new source that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            entries: other.entries.clone(),
            calls: Arc::clone(&other.calls),
            failing: Arc::clone(&other.failing),
        }
    }
}

#[async_trait]
impl LookupSource for StaticLookupSource {
    async fn fetch_lookup(&self, endpoint: &str) -> Result<Vec<LookupEntry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::source("static", "lookup unavailable"));
        }
        Ok(self.entries.get(endpoint).cloned().unwrap_or_default())
    }
}

/// A KeyValueStore that counts calls and can be made to fail
pub struct RecordingStore {
    data: Arc<Mutex<BTreeMap<String, String>>>,
    get_calls: Arc<AtomicUsize>,
    set_calls: Arc<AtomicUsize>,
    flush_calls: Arc<AtomicUsize>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(Mutex::new(BTreeMap::new())),
            get_calls: Arc::new(AtomicUsize::new(0)),
            set_calls: Arc::new(AtomicUsize::new(0)),
            flush_calls: Arc::new(AtomicUsize::new(0)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store with `key` preset to `value`
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get_call_count(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_call_count(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn flush_call_count(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }

    /// Raw stored value
    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap().get(key).cloned()
    }

    /// Create a new store that shares data and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            data: Arc::clone(&other.data),
            get_calls: Arc::clone(&other.get_calls),
            set_calls: Arc::clone(&other.set_calls),
            flush_calls: Arc::clone(&other.flush_calls),
            fail_reads: Arc::clone(&other.fail_reads),
            fail_writes: Arc::clone(&other.fail_writes),
        }
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::store("read failure"));
        }
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::store("write failure"));
        }
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.lock().unwrap().keys().cloned().collect())
    }

    async fn flush(&self) -> Result<()> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Rows `{key_field: "<prefix>-<n>"}` for n in `range`
pub fn rows(key_field: &str, prefix: &str, range: std::ops::Range<u64>) -> Vec<Row> {
    range
        .map(|n| Row::new(json!({ key_field: format!("{}-{}", prefix, n) })))
        .collect()
}

/// Responder paging over `total` rows keyed by `key_field`
///
/// Reads `page` and `page_size` from the request.
pub fn paged(
    key_field: &'static str,
    total: u64,
) -> impl Fn(&ListRequest) -> Result<PageResult> + Send + Sync + 'static {
    move |request: &ListRequest| {
        let page = u64::from(request.page());
        let size: u64 = request
            .param("page_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let start = ((page - 1) * size).min(total);
        let end = (page * size).min(total);
        Ok(PageResult {
            items: rows(key_field, "row", start..end),
            total_count: total,
            has_next: end < total,
        })
    }
}

/// Keys of `rows` under `key_field`
pub fn keys(rows: &[Row], key_field: &str) -> Vec<String> {
    rows.iter().filter_map(|r| r.key(key_field)).collect()
}

/// SourceHandle over a list double and a lookup double
pub fn handle(list: ControlledListSource, lookup: StaticLookupSource) -> SourceHandle {
    SourceHandle {
        list: Arc::new(list),
        lookup: Arc::new(lookup),
    }
}

/// Wait until `condition` holds (panics after 5 seconds)
pub async fn eventually<F: Fn() -> bool>(what: &str, condition: F) {
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(outcome.is_ok(), "timed out waiting for {}", what);
}

/// Events currently queued on `rx`
pub fn drain<T>(rx: &mut tokio::sync::mpsc::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
