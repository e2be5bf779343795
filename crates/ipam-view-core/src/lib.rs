// # ipam-view-core
//
// Core library for the list screens of the IPAM console.
//
// ## Architecture Overview
//
// Each open screen is a `ViewController` built from:
// - **TableSchema**: Columns, filter kinds, paging policy of one screen
// - **QueryState**: Filters, sort, page, visibility, selection, search
// - **derive_request**: Pure mapping of state to a `ListRequest`
// - **FetchCoordinator**: Generation-tagged fetches, prefetch, stale discard
// - **ListSource / LookupSource**: Remote collaborators (REST in production)
// - **KeyValueStore**: Persisted column layout and query per screen
// - **SourceRegistry**: Plugin registry for sources and stores
//
// ## Design Principles
//
// 1. **Pure state**: Query mutations never touch the network or the store
// 2. **Latest request wins**: Only the newest generation reaches the view
// 3. **No flicker**: The previous rows stay visible until replacements land
// 4. **Plugin-Based**: Sources and stores are registered by name
// 5. **Library-First**: The console binary is a thin layer over this crate

pub mod clock;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod descriptor;
pub mod error;
pub mod model;
pub mod query;
pub mod registry;
pub mod request;
pub mod screens;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConsoleConfig, SourceConfig, StoreConfig, ViewConfig};
pub use controller::ViewController;
pub use coordinator::{FetchCoordinator, FetchMode, FetchStatus, ViewEvent, ViewSnapshot};
pub use descriptor::{
    AddressTypeTable, ColumnDescriptor, ExpirationBucket, FilterDescriptor, FilterKind,
    TableSchema,
};
pub use error::{Error, Result};
pub use query::{FilterValue, QueryState, QuickFilter, SortDirection, SortKey, TriState};
pub use registry::SourceRegistry;
pub use request::derive_request;
pub use state::{FileKeyValueStore, MemoryKeyValueStore};
pub use traits::{
    KeyValueStore, ListRequest, ListSource, LookupEntry, LookupSource, PageResult, Row,
    SourceHandle,
};
