//! Extractor configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Browser signature sent to the document service; it rejects default client agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Configuration for content extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Email presented to gated documents
    pub email: String,

    /// Passcode presented to gated documents (may be empty)
    pub passcode: String,

    /// Host of the gated document service; subdomains are accepted too
    pub document_host: String,

    /// Path prefixes that identify a document view
    pub view_path_prefixes: Vec<String>,

    /// Path fragment that marks a multi-document dataroom
    pub dataroom_marker: String,

    /// Base URL of the PDF rendering proxy
    pub render_proxy_url: String,

    /// Ask the rendering proxy for a searchable (text layer) PDF
    pub searchable: bool,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Timeout for the rendering proxy, which renders server-side
    pub render_timeout_secs: u64,

    /// Upper bound for one link or attachment job
    pub job_timeout_secs: u64,

    /// User agent for document service requests
    pub user_agent: String,

    /// Concurrent page workers per PDF
    pub max_page_workers: usize,

    /// Largest attachment that will be downloaded
    pub max_attachment_bytes: usize,

    /// Root for per-call working directories
    pub temp_dir: PathBuf,

    /// Backoff for idempotent requests
    pub retry: RetryPolicy,

    /// OCR fallback settings
    pub ocr: OcrConfig,
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Ceiling for a single delay
    pub max_delay_ms: u64,
}

/// OCR fallback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Run OCR on pages without a text layer
    pub enabled: bool,
    /// Page rasterizer binary
    pub pdftoppm_bin: String,
    /// OCR binary
    pub tesseract_bin: String,
    /// Tesseract language pack
    pub language: String,
    /// Rasterization resolution
    pub dpi: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            passcode: String::new(),
            document_host: "docsend.com".to_string(),
            view_path_prefixes: vec!["/view/".to_string(), "/v/".to_string()],
            dataroom_marker: "/s/".to_string(),
            render_proxy_url: "https://docsend2pdf.com".to_string(),
            searchable: true,
            timeout_secs: 30,
            render_timeout_secs: 60,
            job_timeout_secs: 300,
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_page_workers: 4,
            max_attachment_bytes: 50 * 1024 * 1024,
            temp_dir: std::env::temp_dir().join("dealflow"),
            retry: RetryPolicy::default(),
            ocr: OcrConfig::default(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pdftoppm_bin: "pdftoppm".to_string(),
            tesseract_bin: "tesseract".to_string(),
            language: "eng".to_string(),
            dpi: 150,
        }
    }
}

impl ExtractorConfig {
    /// Set the credentials presented to gated documents
    pub fn with_credentials(mut self, email: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.email = email.into();
        self.passcode = passcode.into();
        self
    }

    /// Point the gated-link policy at another host
    pub fn with_document_host(mut self, host: impl Into<String>) -> Self {
        self.document_host = host.into();
        self
    }

    /// Use another rendering proxy
    pub fn with_render_proxy(mut self, url: impl Into<String>) -> Self {
        self.render_proxy_url = url.into();
        self
    }

    /// Create a new config with custom timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Set the root for working directories
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the number of page workers (at least one)
    pub fn with_page_workers(mut self, workers: usize) -> Self {
        self.max_page_workers = workers.max(1);
        self
    }

    /// Enable or disable the OCR fallback
    pub fn with_ocr(mut self, enabled: bool) -> Self {
        self.ocr.enabled = enabled;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}
