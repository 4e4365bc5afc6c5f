//! Service-key authentication for the internal archive API.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::constants::SERVICE_KEY_HEADER;
use crate::error::ApiError;
use crate::state::AppState;

/// Reject requests whose `x-service-key` header does not match the configured
/// key. With no key configured every internal request is rejected.
///
/// ```ignore
/// let internal = Router::new()
///     .route("/internal/archive/:id", get(fetch_archived))
///     .layer(middleware::from_fn_with_state(state.clone(), service_key_middleware));
/// ```
pub async fn service_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.service_key.as_ref() else {
        tracing::warn!(path = %request.uri().path(), "Internal API called but no service key is configured");
        return Err(ApiError::unauthorized());
    };

    let authorized = request
        .headers()
        .get(SERVICE_KEY_HEADER)
        .is_some_and(|value| expected.matches(value.as_bytes()));

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected internal request");
        return Err(ApiError::unauthorized());
    }

    Ok(next.run(request).await)
}
