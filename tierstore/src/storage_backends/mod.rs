//! Reference adapters for the three storage boundaries.

pub mod file_cold_store;
pub mod memory;
pub mod sqlite_hot_store;
pub mod sqlite_index;

pub use file_cold_store::FileColdStore;
pub use memory::{InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex};
pub use sqlite_hot_store::SqliteHotStore;
pub use sqlite_index::SqliteLocationIndex;
