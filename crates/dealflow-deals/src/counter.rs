//! Persistent sequential deal ids
//!
//! The counter file holds the next number to hand out. Every increment is
//! a read, a write to a sibling temp file and a rename, all under one lock,
//! so concurrent callers sharing a [`DealCounter`] never see the same id.
//! Only one `DealCounter` should own a given file.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Format a counter value as a deal id
pub fn format_deal_id(n: u64) -> String {
    format!("Deal_{:04}", n)
}

#[derive(Debug, Clone)]
pub struct DealCounter {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl DealCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand out the next id and persist the increment
    pub async fn next_id(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        let current = self.read_next().await?;
        self.store(current + 1).await?;
        debug!("Issued {}", format_deal_id(current));
        Ok(format_deal_id(current))
    }

    /// The id the next call to [`DealCounter::next_id`] will return
    pub async fn peek(&self) -> Result<String> {
        let _guard = self.lock.lock().await;
        Ok(format_deal_id(self.read_next().await?))
    }

    async fn read_next(&self) -> Result<u64> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => match contents.trim().parse::<u64>() {
                Ok(n) if n > 0 => Ok(n),
                _ => {
                    warn!("Counter file {} is corrupted. Resetting counter to 1.", self.path.display());
                    Ok(1)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(1),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, next: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, next.to_string()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
