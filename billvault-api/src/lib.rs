//! billvault API - HTTP Service for Tiered Billing Records
//!
//! Serves billing records from a hot tier with a cold-tier fallback, exposes
//! the internal archive-retrieval API, and runs the archival migrator and the
//! hot-tier expiry reaper in the background.

pub mod archive_client;
pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
mod macros;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use archive_client::HttpArchiveClient;
pub use config::{ServiceConfig, ServiceKey};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::{AppState, Tiers};
