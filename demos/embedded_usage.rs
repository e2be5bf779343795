//! Minimal embedding example for ipam-view-core
//!
//! This example drives a hosts table against an in-process inventory instead
//! of the REST API. The controller lifecycle is fully managed by the
//! application.

use ipam_view_core::{
    FilterValue, ListRequest, ListSource, LookupEntry, LookupSource, MemoryKeyValueStore,
    PageResult, Result, Row, SourceHandle, ViewConfig, ViewController, screens,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_stream::StreamExt;

/// In-process host inventory serving list pages and lookups
struct Inventory {
    hosts: Vec<Row>,
    page_calls: AtomicUsize,
}

impl Inventory {
    fn new(count: usize) -> Self {
        let hosts = (0..count)
            .map(|n| {
                Row::new(json!({
                    "mac": format!("00:16:3e:00:00:{:02x}", n),
                    "hostname": format!("host{:02}.example.edu", n),
                    "expires": format!("2025-01-{:02}", n % 28 + 1),
                    "ip_addresses": [format!("10.0.0.{}", n + 1)],
                    "is_dynamic": n % 3 == 0,
                }))
            })
            .collect();
        Self {
            hosts,
            page_calls: AtomicUsize::new(0),
        }
    }

    fn text<'a>(row: &'a Row, field: &str) -> &'a str {
        row.get(field).and_then(|v| v.as_str()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ListSource for Inventory {
    async fn fetch_page(&self, request: &ListRequest) -> Result<PageResult> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        println!("[Inventory] GET {} {:?}", request.endpoint, request.params);

        let mut matching: Vec<Row> = self
            .hosts
            .iter()
            .filter(|row| {
                request
                    .param("hostname")
                    .is_none_or(|needle| Self::text(row, "hostname").contains(needle))
            })
            .cloned()
            .collect();

        if let Some(ordering) = request.param("ordering") {
            for key in ordering.split(',').rev() {
                let (field, descending) = match key.strip_prefix('-') {
                    Some(field) => (field, true),
                    None => (key, false),
                };
                matching.sort_by(|a, b| {
                    let order = Self::text(a, field).cmp(Self::text(b, field));
                    if descending { order.reverse() } else { order }
                });
            }
        }

        let page_size: usize = request
            .param("page_size")
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);
        let start = (request.page() as usize - 1) * page_size;
        let items: Vec<Row> = matching.iter().skip(start).take(page_size).cloned().collect();

        Ok(PageResult {
            has_next: start + items.len() < matching.len(),
            total_count: matching.len() as u64,
            items,
        })
    }

    fn source_name(&self) -> &'static str {
        "inventory"
    }
}

#[async_trait::async_trait]
impl LookupSource for Inventory {
    async fn fetch_lookup(&self, _endpoint: &str) -> Result<Vec<LookupEntry>> {
        Ok(vec![
            LookupEntry {
                id: 1,
                name: "Dynamic".to_string(),
            },
            LookupEntry {
                id: 2,
                name: "Static".to_string(),
            },
        ])
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("=== Embedded ipam-view-core Example ===\n");

    let inventory = Arc::new(Inventory::new(45));
    let sources = SourceHandle::from_shared(inventory.clone());
    let store = Arc::new(MemoryKeyValueStore::new());

    println!("1. Opening the hosts screen...");
    let mut controller =
        ViewController::open(screens::hosts(), sources, store, &ViewConfig::default()).await?;

    // Event listener (optional)
    let listener = controller.take_events().map(|mut events| {
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                println!("[Event] {:?}", event);
            }
        })
    });

    println!("2. Initial fetch (prefetches up to 3 pages)...");
    controller.refresh().await;
    controller.wait_idle().await;
    println!("   {}\n", controller.summary());

    println!("3. Filtering on hostname and sorting by expiry...");
    controller
        .set_filter("hostname", FilterValue::Text("host1".to_string()))
        .await?;
    controller.toggle_sort("expires").await?;
    controller.wait_idle().await;
    for row in controller.rows() {
        println!(
            "   {}  {}",
            Inventory::text(&row, "hostname"),
            Inventory::text(&row, "expires")
        );
    }
    println!("   {}\n", controller.summary());

    println!("4. Selecting every matching row...");
    controller.clear_all_filters().await;
    controller.select_all(true).await;
    controller.wait_idle().await;
    println!("   {} rows selected", controller.selected_rows().len());

    println!("\n5. Closing the controller...");
    controller.close().await;
    drop(controller);
    if let Some(listener) = listener {
        let _ = tokio::time::timeout(std::time::Duration::from_millis(100), listener).await;
    }

    println!(
        "\n=== Done: {} page requests ===",
        inventory.page_calls.load(Ordering::SeqCst)
    );
    Ok(())
}
