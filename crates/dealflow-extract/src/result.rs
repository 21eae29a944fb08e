//! Extraction result types

use crate::workdir::WorkDir;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a fragment came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FragmentSource {
    /// One document behind a gated link (a dataroom yields several)
    Document { link: String, name: String },
    /// The file attached to the message
    Attachment { file_name: String },
}

/// Normalized text contributed by one document or attachment
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub source: FragmentSource,
    pub text: String,
    /// PDF written for this fragment
    pub artifact: Option<PathBuf>,
}

/// A job that contributed nothing
#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    /// Link, document or attachment the job worked on
    pub job: String,
    pub error: String,
    /// The user can fix this by verifying their email with the service
    pub verification_required: bool,
}

/// Combined outcome of one extraction call
#[derive(Debug, Serialize)]
pub struct Extraction {
    /// Message text, caption and fragments joined by blank lines
    pub corpus: String,
    pub fragments: Vec<Fragment>,
    pub failures: Vec<JobFailure>,
    /// Links that passed validation
    pub links: Vec<String>,
    /// Owns the artifacts until placement takes them; dropping the
    /// extraction deletes whatever is left
    #[serde(skip)]
    pub(crate) work_dir: Arc<WorkDir>,
}

impl Extraction {
    /// Directory the artifacts were written to
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    /// Produced PDF paths, in fragment order
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.fragments.iter().filter_map(|f| f.artifact.clone()).collect()
    }

    /// Whether any job needs the user to verify their email
    pub fn needs_verification(&self) -> bool {
        self.failures.iter().any(|f| f.verification_required)
    }
}
