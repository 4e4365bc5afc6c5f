//! billvault Storage - Tier Adapters, Migrator and Reader
//!
//! Defines the adapter contracts for the hot tier, the cold tier and the
//! location index, ships in-memory and durable backends for each, and builds
//! the two core flows on top of them:
//!
//! - [`ArchivalMigrator`]: moves aged records from hot to cold, exactly once
//!   per record, safe to re-run or overlap.
//! - [`TieredReader`]: hot lookup with a cold fallback through the location
//!   index.

pub mod backends;
mod cursor;
pub mod migrator;
pub mod retry;
pub mod tier;
pub mod tiered;

pub use backends::{
    FsColdStore, InMemoryColdStore, InMemoryHotStore, InMemoryLocationIndex, LmdbHotStore,
    LmdbLocationIndex, LmdbStoreError,
};
pub use migrator::{ArchivalMigrator, MigrationSummary, RecordOutcome};
pub use retry::Retrying;
pub use tier::{
    ArchiveLookup, ArchiveSource, ColdStore, HotStore, IndexedArchive, LocationIndex, StalePage,
};
pub use tiered::{Miss, ReadOutcome, TieredReader};
