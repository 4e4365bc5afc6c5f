//! billvault API Server Entry Point
//!
//! Loads configuration, opens the storage tiers, spawns the background jobs
//! and serves HTTP until Ctrl-C.

use billvault_api::jobs::{archival_task, hot_expiry_task, ArchivalJobConfig};
use billvault_api::telemetry::{init_tracing, TelemetryConfig};
use billvault_api::{create_api_router, ApiError, ApiResult, AppState, ServiceConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ServiceConfig::from_env()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::from_config(&config, shutdown_rx.clone())?;

    let mut jobs = Vec::new();
    match config.migration_interval {
        Some(interval) => {
            let job = archival_task(
                state.migrator.clone(),
                ArchivalJobConfig { interval },
                shutdown_rx.clone(),
            );
            jobs.push(tokio::spawn(async move {
                job.await;
            }));
        }
        None => tracing::info!("In-process archival scheduler disabled"),
    }
    let reaper = hot_expiry_task(
        state.tiers.hot.clone(),
        config.reaper_interval,
        shutdown_rx.clone(),
    );
    jobs.push(tokio::spawn(async move {
        reaper.await;
    }));

    let app = create_api_router(state);

    let addr = config.bind_addr;
    tracing::info!(%addr, "Starting billvault API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    for job in jobs {
        if let Err(e) = job.await {
            tracing::error!(error = %e, "Background job panicked");
        }
    }

    tracing::info!("billvault API stopped");
    Ok(())
}
