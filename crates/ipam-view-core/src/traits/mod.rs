//! Collaborator traits for the view core
//!
//! This module defines the abstract interfaces the core depends on.
//!
//! - [`ListSource`]: Remote paged-list endpoint
//! - [`LookupSource`]: Lookup/vocabulary endpoint
//! - [`KeyValueStore`]: Persistent key-value store

pub mod kv_store;
pub mod list_source;

pub use kv_store::{KeyValueStore, KeyValueStoreFactory};
pub use list_source::{
    ListRequest, ListSource, ListSourceFactory, LookupEntry, LookupSource, PageResult,
    Row, SourceHandle,
};
