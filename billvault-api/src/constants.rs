//! Constants for the billvault API
//!
//! Defaults for every setting read by [`crate::config::ServiceConfig`],
//! plus header names shared by the server and the archive client.

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default root directory for the durable tiers.
pub const DEFAULT_DATA_DIR: &str = "./data";

// ============================================================================
// STORAGE
// ============================================================================

/// Default LMDB map size for the hot store, in megabytes.
pub const DEFAULT_HOT_MAP_SIZE_MB: usize = 1024;

/// Default LMDB map size for the location index, in megabytes.
pub const DEFAULT_INDEX_MAP_SIZE_MB: usize = 256;

pub const HOT_DIR: &str = "hot";
pub const INDEX_DIR: &str = "index";
pub const COLD_DIR: &str = "cold";

// ============================================================================
// ARCHIVAL JOBS
// ============================================================================

/// Default interval between scheduled migration runs (24 hours).
pub const DEFAULT_MIGRATION_INTERVAL_SECS: u64 = 86400;

/// Default hot-tier reaper interval.
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

/// Default expiry given to retired hot copies.
pub const DEFAULT_RETIRE_TTL_SECS: u64 = 1;

/// Default number of records migrated concurrently.
pub const DEFAULT_MIGRATION_CONCURRENCY: usize = 8;

// ============================================================================
// TIER RETRIES
// ============================================================================

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 100;
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 2000;

/// Default per-attempt timeout for a single tier call.
pub const DEFAULT_TIER_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// INTERNAL API
// ============================================================================

/// Header carrying the shared service key on internal calls.
pub const SERVICE_KEY_HEADER: &str = "x-service-key";
