//! Filesystem cold store.
//!
//! Objects live at `{root}/{cold_key}`. A write goes to a temp file under
//! `{root}/.staging`, is synced, then hard-linked into place. Linking fails
//! when the target exists, which gives no-clobber semantics, and readers only
//! ever see complete objects.
//!
//! A write is durable once `put_if_absent` returns: the object's data, its
//! directory entry and any partition directories created for it are synced.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use billvault_core::{ColdKey, Tier, TierError, TierResult};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::tier::ColdStore;

const STAGING_DIR: &str = ".staging";

/// Durable cold tier on a local or mounted filesystem.
#[derive(Debug, Clone)]
pub struct FsColdStore {
    root: PathBuf,
}

impl FsColdStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &ColdKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    async fn stage(&self, body: &[u8]) -> std::io::Result<PathBuf> {
        let staged = self
            .root
            .join(STAGING_DIR)
            .join(format!("{}.tmp", Uuid::now_v7()));
        let mut file = tokio::fs::File::create(&staged).await?;
        file.write_all(body).await?;
        file.sync_all().await?;
        Ok(staged)
    }

    /// Directories between the root and `dir` that do not exist yet, outermost
    /// first.
    async fn missing_dirs(&self, dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path == self.root || tokio::fs::try_exists(path).await? {
                break;
            }
            missing.push(path.to_path_buf());
            current = path.parent();
        }
        missing.reverse();
        Ok(missing)
    }

    /// Create `dir` and sync the parent of every directory created for it.
    async fn create_partition(&self, dir: &Path) -> std::io::Result<()> {
        let missing = self.missing_dirs(dir).await?;
        if missing.is_empty() {
            return Ok(());
        }
        tokio::fs::create_dir_all(dir).await?;
        for created in &missing {
            if let Some(parent) = created.parent() {
                sync_dir(parent).await?;
            }
        }
        Ok(())
    }
}

/// Flush a directory's entries to disk.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

fn io_err(operation: &'static str) -> impl Fn(std::io::Error) -> TierError {
    move |e| TierError::transient(Tier::Cold, operation, e)
}

#[async_trait]
impl ColdStore for FsColdStore {
    async fn exists(&self, key: &ColdKey) -> TierResult<bool> {
        tokio::fs::try_exists(self.object_path(key))
            .await
            .map_err(io_err("exists"))
    }

    async fn put_if_absent(&self, key: &ColdKey, body: &[u8]) -> TierResult<bool> {
        let op = "put_if_absent";
        let target = self.object_path(key);
        let Some(parent) = target.parent() else {
            return Err(TierError::corrupt(Tier::Cold, key.as_str(), "key has no parent"));
        };
        self.create_partition(parent).await.map_err(io_err(op))?;

        let staged = self.stage(body).await.map_err(io_err(op))?;
        let linked = tokio::fs::hard_link(&staged, &target).await;
        if let Err(e) = tokio::fs::remove_file(&staged).await {
            tracing::debug!(path = %staged.display(), error = %e, "failed to remove staged object");
        }

        let created = match linked {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => return Err(io_err(op)(e)),
        };
        // An existing entry may come from a concurrent writer that has not
        // synced its directory yet.
        sync_dir(parent).await.map_err(io_err(op))?;
        Ok(created)
    }

    async fn get(&self, key: &ColdKey) -> TierResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("get")(e)),
        }
    }
}
