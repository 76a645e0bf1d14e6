//! Error types shared across the recognition pipeline
//!
//! Pure stages (presence classification, name normalization) never fail.
//! Only the stages that touch an external collaborator have an error type.

use thiserror::Error;

/// Failure of the text-recognition engine
#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    /// Engine could not be constructed or an invocation failed
    #[error("Recognition engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The raster could not be handed to the engine
    #[error("Invalid image for recognition: {0}")]
    InvalidImage(String),
}

/// Failure talking to the card catalog service
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Service answered 429 (after the single back-off retry)
    #[error("Catalog rate limit exceeded")]
    RateLimited,

    /// Any non-404 HTTP error, carrying the upstream detail when present
    #[error("Catalog error {status}: {details}")]
    Upstream { status: u16, details: String },

    /// Connection, timeout or other transport failure
    #[error("Catalog request failed: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Failed to decode catalog response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CatalogError::Decode(err.to_string())
        } else {
            CatalogError::Transport(err.to_string())
        }
    }
}

/// Failure of the durable cache tier
///
/// Never surfaced to the consumer: the orchestrator logs it and carries on
/// with the in-process tier.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache entry encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Cache store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
