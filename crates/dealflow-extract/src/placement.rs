//! Moves finished artifacts into per-account storage

use crate::error::Result;
use crate::result::Extraction;
use crate::workdir::sanitize_name;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What happened to each artifact
#[derive(Debug, Default, Clone, Serialize)]
pub struct PlacementReport {
    /// Files now in the account directory
    pub placed: Vec<PathBuf>,
    /// Sources deleted because the account already had a file by that name
    pub duplicates: Vec<PathBuf>,
    /// Sources that were already gone
    pub missing: Vec<PathBuf>,
    /// Sources that could not be moved
    pub failed: Vec<PathBuf>,
}

/// Per-account artifact storage rooted at `accounts_root`
#[derive(Debug, Clone)]
pub struct ArtifactPlacement {
    accounts_root: PathBuf,
}

impl ArtifactPlacement {
    pub fn new(accounts_root: impl Into<PathBuf>) -> Self {
        Self {
            accounts_root: accounts_root.into(),
        }
    }

    /// Directory that holds one account's artifacts
    pub fn account_dir(&self, key: &str) -> PathBuf {
        self.accounts_root.join(sanitize_name(key))
    }

    /// Move `artifacts` into the account directory for `key`, then remove
    /// `work_dir` if it ended up empty. Individual file failures are logged
    /// and reported; nothing already placed is rolled back.
    pub async fn place(&self, key: &str, artifacts: &[PathBuf], work_dir: Option<&Path>) -> Result<PlacementReport> {
        let mut report = PlacementReport::default();
        if artifacts.is_empty() {
            if let Some(dir) = work_dir {
                remove_if_empty(dir).await;
            }
            return Ok(report);
        }

        let target_dir = self.account_dir(key);
        tokio::fs::create_dir_all(&target_dir).await?;

        for source in artifacts {
            let Some(file_name) = source.file_name() else {
                warn!("Artifact path {} has no file name, skipping", source.display());
                report.failed.push(source.clone());
                continue;
            };
            if !tokio::fs::try_exists(source).await.unwrap_or(false) {
                debug!("Artifact {} already handled", source.display());
                report.missing.push(source.clone());
                continue;
            }

            let target = target_dir.join(file_name);
            if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                match tokio::fs::remove_file(source).await {
                    Ok(()) => {
                        info!("{} already stored for {}, dropped duplicate", target.display(), key);
                        report.duplicates.push(source.clone());
                    }
                    Err(e) => {
                        warn!("Failed to delete duplicate {}: {}", source.display(), e);
                        report.failed.push(source.clone());
                    }
                }
                continue;
            }

            match move_file(source, &target).await {
                Ok(()) => {
                    info!("Stored {} for {}", target.display(), key);
                    report.placed.push(target);
                }
                Err(e) => {
                    warn!("Failed to move {} to {}: {}", source.display(), target.display(), e);
                    report.failed.push(source.clone());
                }
            }
        }

        if let Some(dir) = work_dir {
            remove_if_empty(dir).await;
        }
        Ok(report)
    }

    /// Take ownership of an extraction's artifacts and store them under `key`.
    /// The work directory is gone afterwards, placed or not.
    pub async fn place_extraction(&self, key: &str, extraction: Extraction) -> Result<PlacementReport> {
        let artifacts = extraction.artifacts();
        let work_dir = extraction.work_dir;
        self.place(key, &artifacts, Some(work_dir.path())).await
    }
}

/// Rename, falling back to copy + delete across filesystems
async fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(source, target).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, target).await?;
    tokio::fs::remove_file(source).await
}

async fn remove_if_empty(dir: &Path) {
    match tokio::fs::remove_dir(dir).await {
        Ok(()) => debug!("Removed work dir {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Work dir {} left in place: {}", dir.display(), e),
    }
}
