//! Error types for Engram

use thiserror::Error;

/// Main error type for Engram operations
#[derive(Error, Debug)]
pub enum EngramError {
    /// Contradictory or unusable settings, detected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedding model or the persistent store failed (disk, index, timeout)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A caller tried to write a metadata value reserved for compaction records
    #[error("Reserved metadata: {0}")]
    ReservedMetadata(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngramError {
    /// Whether retrying the same call might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngramError::ProviderUnavailable(_))
    }
}

/// Result type alias for Engram operations
pub type Result<T> = std::result::Result<T, EngramError>;
