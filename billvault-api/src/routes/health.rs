//! Health Check Endpoints
//!
//! - /health/live - Process alive check
//! - /health/ready - Hot tier and location index reachable
//!
//! No authentication required for health endpoints.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use billvault_core::{RecordId, TierResult};
use serde::{Deserialize, Serialize};

use crate::state::{AppState, Tiers};

/// Id used for readiness point lookups. Never written.
const PROBE_ID: &str = "__billvault_readiness_probe";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub hot: ComponentHealth,
    pub index: ComponentHealth,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn from_probe(started: Instant, result: TierResult<()>) -> Self {
        match result {
            Ok(()) => Self {
                status: HealthStatus::Healthy,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
            },
            Err(e) => Self {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready
pub async fn readiness(State(tiers): State<Tiers>) -> impl IntoResponse {
    let probe = match RecordId::parse(PROBE_ID) {
        Ok(id) => id,
        Err(e) => {
            let response = HealthResponse {
                status: HealthStatus::Unhealthy,
                message: Some(e.to_string()),
                details: None,
            };
            return (StatusCode::SERVICE_UNAVAILABLE, Json(response));
        }
    };

    let started = Instant::now();
    let hot = ComponentHealth::from_probe(started, tiers.hot.get(&probe).await.map(|_| ()));
    let started = Instant::now();
    let index = ComponentHealth::from_probe(started, tiers.index.get(&probe).await.map(|_| ()));

    let overall = if hot.status == HealthStatus::Healthy && index.status == HealthStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let response = HealthResponse {
        status: overall,
        message: None,
        details: Some(HealthDetails {
            hot,
            index,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    };

    let status_code = if overall == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("Process is alive".to_string()),
            details: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_probe_id_is_valid() {
        assert!(RecordId::parse(PROBE_ID).is_ok());
    }
}
