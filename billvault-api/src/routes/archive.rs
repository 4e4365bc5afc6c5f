//! Internal Archive API
//!
//! Served to other services holding the shared service key:
//! - `GET /internal/archive/:id` resolves a record through the local location
//!   index and cold store only, never the hot tier.
//! - `POST /internal/archive/runs` runs one migration immediately and returns
//!   its summary.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use billvault_core::RecordId;
use billvault_storage::{ArchiveLookup, MigrationSummary};
use chrono::Utc;

use crate::error::{ApiError, ApiResult};
use crate::middleware::service_key_middleware;
use crate::routes::records::json_body;
use crate::state::AppState;

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /internal/archive/:id
pub async fn fetch_archived(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = RecordId::parse(id)?;

    match state.local_archive.fetch(&id).await? {
        ArchiveLookup::Found(body) => Ok(json_body(body, "cold")),
        ArchiveLookup::NoEntry => Err(ApiError::record_not_found(&id)),
        ArchiveLookup::MissingObject { cold_key } => {
            tracing::warn!(
                record_id = %id,
                cold_key = %cold_key,
                "location index points at a missing cold object"
            );
            Err(ApiError::record_not_found(&id))
        }
    }
}

/// POST /internal/archive/runs
pub async fn trigger_run(State(state): State<AppState>) -> Json<MigrationSummary> {
    tracing::info!("Manual migration run requested");
    let summary = state.migrator.run(Utc::now(), &state.shutdown).await;
    Json(summary)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Internal routes, all behind the service-key check.
pub fn create_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/internal/archive/runs", post(trigger_run))
        .route("/internal/archive/:id", get(fetch_archived))
        .route_layer(from_fn_with_state(state, service_key_middleware))
}
