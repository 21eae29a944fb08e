//! Error types for deal bookkeeping

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DealError>;

#[derive(Error, Debug)]
pub enum DealError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// The field-extraction collaborator failed
    #[error("Field extraction failed: {0}")]
    Extractor(String),

    /// The record store failed
    #[error("Record store failed: {0}")]
    Sink(String),

    /// A reply arrived for a message nobody is waiting on
    #[error("No pending fields for message {0}")]
    NotPending(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for DealError {
    fn from(err: tokio::task::JoinError) -> Self {
        DealError::Task(err.to_string())
    }
}
