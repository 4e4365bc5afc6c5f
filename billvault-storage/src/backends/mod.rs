//! Tier backends: in-memory fakes and durable implementations.

mod fs;
mod lmdb;
mod memory;

pub use fs::FsColdStore;
pub use lmdb::{LmdbHotStore, LmdbLocationIndex, LmdbStoreError};
pub use memory::{InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex};
