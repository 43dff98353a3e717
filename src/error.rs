//! Error types for cardsync
//!
//! Every failure is folded into exactly one [`ErrorClass`] before it reaches the
//! run boundary, where it becomes a single DELAY or ERROR outcome.

use crate::source::retry::{RetryDecision, RetryableError};
use thiserror::Error;

/// Result type alias for cardsync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// The four failure classes a run can end with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or invalid credentials and parameters. Never retried.
    Configuration,
    /// 429-equivalent. Converted to DELAY, resumable via CONTINUE.
    TransientRateLimit,
    /// Any other source, sink or storage failure. Fatal for the run.
    SourceApi,
    /// A single record failed schema mapping.
    Normalization,
}

/// Comprehensive error type for cardsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected credentials (401/403)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limited, with the delay in seconds the host should wait
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Non-success response from the source API
    #[error("Source API error ({status}): {message}")]
    SourceApi { status: u16, message: String },

    /// A single record could not be mapped
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// Every record of a phase failed to normalize
    #[error("All {failed} records of phase '{phase}' failed normalization")]
    SystemicNormalization { phase: String, failed: usize },

    /// Downstream sink rejected a batch
    #[error("Sink error: {0}")]
    Sink(String),

    /// State persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Fold this error into its failure class
    pub fn class(&self) -> ErrorClass {
        match self {
            SyncError::Config(_) | SyncError::Auth(_) => ErrorClass::Configuration,
            SyncError::RateLimited(_) => ErrorClass::TransientRateLimit,
            SyncError::Normalization(_) => ErrorClass::Normalization,
            SyncError::SourceApi { .. }
            | SyncError::SystemicNormalization { .. }
            | SyncError::Sink(_)
            | SyncError::Storage(_)
            | SyncError::Io(_)
            | SyncError::Json(_)
            | SyncError::Yaml(_)
            | SyncError::Database(_)
            | SyncError::Http(_)
            | SyncError::Other(_) => ErrorClass::SourceApi,
        }
    }
}

impl RetryableError for SyncError {
    fn retry_decision(&self) -> RetryDecision {
        match self {
            // Only failures that never produced a status are retried in-process.
            // A 429 must reach the host as DELAY.
            SyncError::Http(e) if e.is_connect() || e.is_timeout() => RetryDecision::Retry,
            _ => RetryDecision::NoRetry,
        }
    }
}
