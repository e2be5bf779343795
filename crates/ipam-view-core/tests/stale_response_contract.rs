//! Architectural Contract Test: Stale Response Discard
//!
//! This test verifies that only the newest request may change the visible
//! state, and that cancellation leaves nothing running.
//!
//! Constraints verified:
//! - A response of a superseded generation is dropped, even when it arrives
//!   after the newer one
//! - A failure of a superseded generation is not surfaced
//! - cancel() stops prefetch continuation
//! - reset() leaves no partial state behind
//! - Dropping the coordinator aborts in-flight fetches
//!
//! If this test fails, someone has:
//! - Applied responses without checking their generation
//! - Added detached tasks that outlive the coordinator

mod common;

use common::*;
use ipam_view_core::error::Error;
use ipam_view_core::traits::{ListRequest, PageResult};
use ipam_view_core::{FetchCoordinator, FetchMode, FetchStatus, ViewEvent};
use std::sync::Arc;
use std::time::Duration;

/// Rows keyed `<hostname>-0`, `<hostname>-1`; hostname `bad` fails
fn by_hostname(request: &ListRequest) -> ipam_view_core::Result<PageResult> {
    let name = request.param("hostname").unwrap_or("none").to_string();
    if name == "bad" {
        return Err(Error::http("HTTP 500: upstream failure"));
    }
    Ok(PageResult {
        items: rows("mac", &name, 0..2),
        total_count: 2,
        has_next: false,
    })
}

fn request(hostname: &str) -> ListRequest {
    ListRequest::new("hosts/")
        .with_param("hostname", hostname)
        .with_param("page", "1")
        .with_param("page_size", "10")
}

#[tokio::test]
async fn late_response_of_superseded_request_is_discarded() {
    let source = ControlledListSource::gated(by_hostname);
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, mut events) = FetchCoordinator::new(Arc::new(source), 64);

    let first = coordinator.refresh(request("one"), FetchMode::SinglePage, false);
    probe.wait_for_calls(1).await;
    let second = coordinator.refresh(request("two"), FetchMode::SinglePage, false);
    probe.wait_for_calls(2).await;

    // R2 answers first
    probe.release(1);
    eventually("R2 applied", || coordinator.rows_generation() == Some(second)).await;

    // R1 answers late
    probe.release(0);
    probe.wait_for_completions(2).await;
    coordinator.wait_idle().await;

    assert_eq!(
        keys(&coordinator.rows(), "mac"),
        vec!["two-0".to_string(), "two-1".to_string()]
    );
    assert_eq!(coordinator.status(), FetchStatus::Ready);

    let events = drain(&mut events);
    assert!(events.contains(&ViewEvent::StaleDiscarded {
        generation: first,
        page: 1
    }));
    assert!(!events.iter().any(|e| matches!(
        e,
        ViewEvent::RowsReplaced { generation, .. } if *generation == first
    )));
}

#[tokio::test]
async fn failure_of_superseded_request_is_not_surfaced() {
    let source = ControlledListSource::gated(by_hostname);
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, mut events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request("bad"), FetchMode::SinglePage, false);
    probe.wait_for_calls(1).await;
    coordinator.refresh(request("good"), FetchMode::SinglePage, false);
    probe.wait_for_calls(2).await;

    probe.release(1);
    probe.release(0);
    probe.wait_for_completions(2).await;
    coordinator.wait_idle().await;

    assert_eq!(coordinator.status(), FetchStatus::Ready);
    assert_eq!(coordinator.rows().len(), 2);
    assert!(!drain(&mut events)
        .iter()
        .any(|e| matches!(e, ViewEvent::FetchFailed { .. })));
}

#[tokio::test]
async fn cancel_stops_prefetch_continuation() {
    let source = ControlledListSource::gated(paged("mac", 50));
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(
        request("any"),
        FetchMode::Prefetch { max_pages: None },
        false,
    );
    probe.wait_for_calls(1).await;
    probe.release(0);
    probe.wait_for_calls(2).await;

    coordinator.cancel();
    probe.release(1);
    coordinator.wait_idle().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(probe.call_count(), 2, "no page requested after cancel");
    assert_eq!(coordinator.rows().len(), 10);
    assert_eq!(coordinator.status(), FetchStatus::Ready);
}

#[tokio::test]
async fn reset_leaves_no_partial_state() {
    let source = ControlledListSource::immediate(by_hostname);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request("one"), FetchMode::SinglePage, false);
    coordinator.wait_idle().await;
    assert_eq!(coordinator.rows().len(), 2);

    coordinator.reset();
    let snapshot = coordinator.snapshot();
    assert!(snapshot.rows.is_empty());
    assert!(coordinator.previous_rows().is_empty());
    assert_eq!(snapshot.status, FetchStatus::Idle);

    coordinator.refresh(request("two"), FetchMode::SinglePage, false);
    coordinator.wait_idle().await;
    assert_eq!(
        keys(&coordinator.rows(), "mac"),
        vec!["two-0".to_string(), "two-1".to_string()]
    );
    assert!(coordinator.previous_rows().is_empty());
}

#[tokio::test]
async fn dropping_the_coordinator_aborts_in_flight_fetches() {
    let source = ControlledListSource::gated(by_hostname);
    let probe = ControlledListSource::sharing_counters_with(&source);
    let (mut coordinator, _events) = FetchCoordinator::new(Arc::new(source), 64);

    coordinator.refresh(request("one"), FetchMode::SinglePage, false);
    probe.wait_for_calls(1).await;

    drop(coordinator);
    probe.release(0);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(probe.completed_count(), 0);
}
