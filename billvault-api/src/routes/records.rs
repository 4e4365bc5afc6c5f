//! Public Read API
//!
//! `GET /records/:id` serves a record from whichever tier holds it. The
//! response body is the record's canonical JSON, byte-identical whether it
//! came from the hot or the cold tier.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use billvault_core::RecordId;
use billvault_storage::{ReadOutcome, TieredReader};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Header naming the tier that served the read.
pub const SERVED_FROM_HEADER: &str = "x-billvault-tier";

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /records/:id
pub async fn get_record(
    State(reader): State<TieredReader>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = RecordId::parse(id)?;

    match reader.read(&id).await? {
        ReadOutcome::Found { tier, body } => Ok(json_body(body, &tier.to_string())),
        ReadOutcome::NotFound(_) => Err(ApiError::record_not_found(&id)),
    }
}

/// Raw JSON bytes with the serving tier attached.
pub(crate) fn json_body(body: Vec<u8>, tier: &str) -> Response {
    let mut response = (
        StatusCode::OK,
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        body,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(tier) {
        response.headers_mut().insert(SERVED_FROM_HEADER, value);
    }
    response
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/records/:id", get(get_record))
}
