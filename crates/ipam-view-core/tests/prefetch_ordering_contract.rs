//! Architectural Contract Test: Prefetch Ordering
//!
//! This test verifies the two paging policies of the fetch coordinator.
//!
//! Constraints verified:
//! - Prefetch requests pages strictly in order, one at a time
//! - Accumulated rows are page1 ++ page2 ++ page3
//! - The default prefetch bound caps the number of requests
//! - "Select all" loads every page from page 1, in any mode
//! - Single-page mode issues exactly one request per refresh
//! - A failure mid-prefetch keeps the pages already accumulated
//!
//! If this test fails, someone has:
//! - Parallelized page requests
//! - Removed the prefetch bound
//! - Made a continuation replace instead of append

mod common;

use common::*;
use ipam_view_core::error::Error;
use ipam_view_core::traits::ListRequest;
use ipam_view_core::{FetchCoordinator, FetchMode, FetchStatus, ViewEvent};
use std::sync::Arc;
use std::time::Duration;

fn request(page: u32) -> ListRequest {
    ListRequest::new("addresses/")
        .with_param("page", page.to_string())
        .with_param("page_size", "10")
}

fn expected(range: std::ops::Range<u64>) -> Vec<String> {
    range.map(|n| format!("row-{}", n)).collect()
}

#[tokio::test]
async fn pages_are_requested_in_order_after_each_is_accumulated() {
    let source = ControlledListSource::gated(paged("address", 30));
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request(1), FetchMode::prefetch(), false);
    probe.wait_for_calls(1).await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(probe.call_count(), 1, "page 2 requested before page 1 landed");

    probe.release(0);
    probe.wait_for_calls(2).await;
    assert_eq!(coordinator.rows().len(), 10, "page 1 accumulated first");
    assert_eq!(coordinator.status(), FetchStatus::Prefetching);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(probe.call_count(), 2, "page 3 requested before page 2 landed");

    probe.release(1);
    probe.wait_for_calls(3).await;
    assert_eq!(coordinator.rows().len(), 20);

    probe.release(2);
    coordinator.wait_idle().await;

    let pages: Vec<u32> = probe.requests().iter().map(ListRequest::page).collect();
    assert_eq!(pages, vec![1, 2, 3]);

    let snapshot = coordinator.snapshot();
    assert_eq!(keys(&snapshot.rows, "address"), expected(0..30));
    assert_eq!(snapshot.pages_loaded, 3);
    assert!(!snapshot.has_next);
    assert_eq!(snapshot.status, FetchStatus::Ready);
}

#[tokio::test]
async fn default_bound_caps_prefetch() {
    let source = ControlledListSource::immediate(paged("address", 100));
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request(1), FetchMode::prefetch(), false);
    coordinator.wait_idle().await;

    assert_eq!(probe.call_count(), 3);
    let snapshot = coordinator.snapshot();
    assert_eq!(snapshot.rows.len(), 30);
    assert!(snapshot.has_next);
    assert_eq!(snapshot.summary(), "Loaded 30 of 100 rows");
}

#[tokio::test]
async fn select_all_loads_every_page_from_page_one() {
    let source = ControlledListSource::immediate(paged("address", 95));
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request(4), FetchMode::SinglePage, true);
    coordinator.wait_idle().await;

    let pages: Vec<u32> = probe.requests().iter().map(ListRequest::page).collect();
    assert_eq!(pages, (1..=10).collect::<Vec<u32>>());
    assert_eq!(keys(&coordinator.rows(), "address"), expected(0..95));
    assert_eq!(coordinator.summary(), "Loaded 95 of 95 rows");
}

#[tokio::test]
async fn single_page_mode_issues_one_request_and_replaces() {
    let source = ControlledListSource::immediate(paged("address", 95));
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request(1), FetchMode::SinglePage, false);
    coordinator.wait_idle().await;
    coordinator.refresh(request(2), FetchMode::SinglePage, false);
    coordinator.wait_idle().await;

    assert_eq!(probe.call_count(), 2);
    assert_eq!(keys(&coordinator.rows(), "address"), expected(10..20));
    assert_eq!(keys(&coordinator.previous_rows(), "address"), expected(0..10));
}

#[tokio::test]
async fn failure_mid_prefetch_keeps_accumulated_rows() {
    let source = ControlledListSource::immediate(|request: &ListRequest| {
        if request.page() == 2 {
            return Err(Error::http("HTTP 502: bad gateway"));
        }
        paged("address", 50)(request)
    });
    let (mut coordinator, mut events) = FetchCoordinator::new(Arc::new(source), 64);

    let generation = coordinator.refresh(request(1), FetchMode::prefetch(), false);
    coordinator.wait_idle().await;

    assert_eq!(keys(&coordinator.rows(), "address"), expected(0..10));
    assert!(matches!(coordinator.status(), FetchStatus::Failed(_)));

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        ViewEvent::FetchFailed { generation: g, .. } if *g == generation
    )));
}

#[tokio::test]
async fn out_of_range_page_yields_empty_rows() {
    let source = ControlledListSource::immediate(paged("address", 15));
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request(9), FetchMode::SinglePage, false);
    coordinator.wait_idle().await;

    let snapshot = coordinator.snapshot();
    assert!(snapshot.rows.is_empty());
    assert_eq!(snapshot.total_count, 15);
    assert_eq!(snapshot.status, FetchStatus::Ready);
}
