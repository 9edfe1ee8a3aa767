//! Error types for birdbridge

use thiserror::Error;

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Main error type for the sync pipeline
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No feed provider available ({tried} tried)")]
    ProviderUnavailable { tried: usize },

    #[error("Feed returned no usable data")]
    NoData,

    #[error("Attachment unavailable: {url}")]
    AttachmentUnavailable { url: String },

    #[error("Source post {source_id} already recorded")]
    DuplicateKey { source_id: String },

    #[error("Submit failed for source post {source_id}: {message}")]
    SubmitFailed { source_id: String, message: String },

    #[error("Cursor store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Target API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Check if error is worth retrying on a later cycle
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ProviderUnavailable { .. }
                | BridgeError::Http(_)
                | BridgeError::SubmitFailed { .. }
        ) || matches!(self, BridgeError::Api { status, .. } if *status >= 500 || *status == 429)
    }

    /// Benign outcomes that mean "nothing to do", not "something broke"
    pub fn is_benign(&self) -> bool {
        matches!(self, BridgeError::NoData | BridgeError::DuplicateKey { .. })
    }
}
