//! Error types for content extraction

use thiserror::Error;

/// Result type for extraction operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors that can occur during content extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Network error during fetch
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP error response
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// The document service wants the viewer to confirm their email first
    #[error("Email verification required before {url} can be viewed")]
    VerificationRequired { url: String },

    /// Authentication challenge without a usable CSRF token
    #[error("Missing CSRF token: {0}")]
    MissingCsrfToken(String),

    /// Dataroom manifest could not be decoded
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// PDF extraction error
    #[error("PDF error: {0}")]
    Pdf(String),

    /// OCR fallback failed
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Content too large
    #[error("Content too large: {size} bytes exceeds max {max} bytes")]
    ContentTooLarge { size: usize, max: usize },

    /// Timeout error
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// Nothing usable came out of a message
    #[error("No usable content: {0}")]
    NoContent(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ExtractError {
    /// Whether repeating the same idempotent request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractError::Network(_) | ExtractError::Timeout(_) => true,
            ExtractError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Whether the user can fix this by verifying their email with the service
    pub fn is_verification_required(&self) -> bool {
        matches!(self, ExtractError::VerificationRequired { .. })
    }

    /// Convert a transport error, reporting timeouts with the limit that applied
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ExtractError::Timeout(timeout_secs)
        } else {
            err.into()
        }
    }
}

impl From<reqwest::Error> for ExtractError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExtractError::Timeout(30)
        } else if let Some(status) = err.status() {
            ExtractError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            ExtractError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ExtractError {
    fn from(err: url::ParseError) -> Self {
        ExtractError::InvalidUrl(err.to_string())
    }
}

impl From<lopdf::Error> for ExtractError {
    fn from(err: lopdf::Error) -> Self {
        ExtractError::Pdf(err.to_string())
    }
}
