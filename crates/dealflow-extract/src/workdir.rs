//! Per-call working directory for in-flight PDFs

use crate::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

static UNSAFE_NAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-_.]").unwrap());

/// Replace everything but word characters, `-`, `_` and `.` with `_`
pub fn sanitize_name(name: &str) -> String {
    let cleaned = UNSAFE_NAME_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// A directory owned by one extraction call.
///
/// Dropping it removes the directory and everything still in it.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    claimed: Mutex<HashSet<String>>,
}

impl WorkDir {
    /// Create a fresh, uniquely named directory under `root`
    pub async fn create(root: &Path) -> Result<Self> {
        let path = root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        debug!("Created work dir {}", path.display());
        Ok(Self {
            path,
            claimed: Mutex::new(HashSet::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve a unique `.pdf` file path for `name`; concurrent callers never
    /// receive the same path.
    pub async fn claim(&self, name: &str) -> PathBuf {
        let base = sanitize_name(name);
        let stem = base
            .strip_suffix(".pdf")
            .or_else(|| base.strip_suffix(".PDF"))
            .unwrap_or(&base)
            .to_string();

        let mut claimed = self.claimed.lock().await;
        let mut file_name = format!("{}.pdf", stem);
        let mut n = 2;
        while claimed.contains(&file_name) {
            file_name = format!("{}_{}.pdf", stem, n);
            n += 1;
        }
        claimed.insert(file_name.clone());
        self.path.join(file_name)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed work dir {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove work dir {}: {}", self.path.display(), e),
        }
    }
}
