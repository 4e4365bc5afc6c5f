//! Application state shared by all handlers and background jobs.

use std::sync::Arc;

use billvault_core::ArchivalConfig;
use billvault_storage::{
    ArchivalMigrator, ArchiveSource, ColdStore, FsColdStore, HotStore, IndexedArchive,
    LmdbHotStore, LmdbLocationIndex, LocationIndex, Retrying, TieredReader,
};
use tokio::sync::watch;

use crate::archive_client::HttpArchiveClient;
use crate::config::{ServiceConfig, ServiceKey};
use crate::constants::{COLD_DIR, HOT_DIR, INDEX_DIR};
use crate::error::{ApiError, ApiResult};

/// Handles to the three storage tiers, constructed once at start-up.
#[derive(Clone)]
pub struct Tiers {
    pub hot: Arc<dyn HotStore>,
    pub cold: Arc<dyn ColdStore>,
    pub index: Arc<dyn LocationIndex>,
}

impl Tiers {
    /// Open the durable backends under `config.data_dir`, each wrapped in the
    /// retry decorator.
    pub fn open(config: &ServiceConfig) -> ApiResult<Self> {
        let hot = LmdbHotStore::open(config.data_dir.join(HOT_DIR), config.hot_map_size_mb)
            .map_err(|e| ApiError::internal_error(format!("Failed to open hot store: {}", e)))?;
        let index =
            LmdbLocationIndex::open(config.data_dir.join(INDEX_DIR), config.index_map_size_mb)
                .map_err(|e| {
                    ApiError::internal_error(format!("Failed to open location index: {}", e))
                })?;
        let cold = FsColdStore::open(config.data_dir.join(COLD_DIR))
            .map_err(|e| ApiError::internal_error(format!("Failed to open cold store: {}", e)))?;

        tracing::info!(data_dir = %config.data_dir.display(), "Storage tiers opened");

        Ok(Self {
            hot: Arc::new(Retrying::new(Arc::new(hot), config.retry.clone())),
            cold: Arc::new(Retrying::new(Arc::new(cold), config.retry.clone())),
            index: Arc::new(Retrying::new(Arc::new(index), config.retry.clone())),
        })
    }

    /// Archive resolution through this process's own index and cold store.
    pub fn local_archive(&self) -> Arc<dyn ArchiveSource> {
        Arc::new(IndexedArchive::new(self.index.clone(), self.cold.clone()))
    }
}

/// Shared state for the Axum router.
#[derive(Clone)]
pub struct AppState {
    pub tiers: Tiers,
    /// Public read path: hot first, then the configured archive.
    pub reader: TieredReader,
    /// Backs the internal archive-retrieval API.
    pub local_archive: Arc<dyn ArchiveSource>,
    pub migrator: ArchivalMigrator,
    pub service_key: Option<ServiceKey>,
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    /// Wire the reader and migrator over `tiers`. When `remote` is given the
    /// reader's cold fallback goes through it instead of the local archive.
    pub fn new(
        tiers: Tiers,
        remote: Option<Arc<dyn ArchiveSource>>,
        archival: ArchivalConfig,
        service_key: Option<ServiceKey>,
        shutdown: watch::Receiver<bool>,
    ) -> ApiResult<Self> {
        let local_archive = tiers.local_archive();
        let fallback = remote.unwrap_or_else(|| local_archive.clone());
        let reader = TieredReader::new(tiers.hot.clone(), fallback);
        let migrator = ArchivalMigrator::new(
            tiers.hot.clone(),
            tiers.cold.clone(),
            tiers.index.clone(),
            archival,
        )?;

        Ok(Self {
            tiers,
            reader,
            local_archive,
            migrator,
            service_key,
            shutdown,
        })
    }

    /// Build the full service state from configuration.
    pub fn from_config(config: &ServiceConfig, shutdown: watch::Receiver<bool>) -> ApiResult<Self> {
        let tiers = Tiers::open(config)?;

        let remote = match (&config.archive_url, &config.service_key) {
            (Some(url), Some(key)) => {
                tracing::info!(archive_url = %url, "Using remote archive for cold reads");
                let client =
                    HttpArchiveClient::new(url.clone(), key.clone(), config.retry.attempt_timeout)?;
                let retrying = Retrying::new(Arc::new(client), config.retry.clone());
                Some(Arc::new(retrying) as Arc<dyn ArchiveSource>)
            }
            (Some(_), None) => {
                return Err(ApiError::internal_error(
                    "BILLVAULT_ARCHIVE_URL requires BILLVAULT_SERVICE_KEY",
                ))
            }
            _ => None,
        };

        Self::new(
            tiers,
            remote,
            config.archival.clone(),
            config.service_key.clone(),
            shutdown,
        )
    }
}

crate::impl_from_ref!(TieredReader, reader);
crate::impl_from_ref!(ArchivalMigrator, migrator);
crate::impl_from_ref!(Tiers, tiers);
