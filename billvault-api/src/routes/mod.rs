//! HTTP Routes
//!
//! - Public read API (`/records/:id`)
//! - Internal archive API (`/internal/archive/...`, service key required)
//! - Health check endpoints (Kubernetes-compatible)

pub mod archive;
pub mod health;
pub mod records;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use archive::create_router as archive_router;
pub use health::create_router as health_router;
pub use records::create_router as records_router;

/// Assemble the full service router.
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .merge(records_router())
        .merge(archive_router(state.clone()))
        .merge(health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
