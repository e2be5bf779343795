// # Key-Value Store Implementations
//
// This module provides implementations of the KeyValueStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::{FileKeyValueStore, FileKeyValueStoreFactory};
pub use memory::{MemoryKeyValueStore, MemoryKeyValueStoreFactory};
