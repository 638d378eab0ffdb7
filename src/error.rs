//! Error handling for the vigil engine

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not found (analysis, alert, ...)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Frame source failure (decode/read), unrecoverable for the video
    #[error("Frame source error: {0}")]
    FrameSource(String),

    /// Detection source failure (single frame, recoverable)
    #[error("Detection error: {0}")]
    Detection(String),

    /// Alert/event persistence failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Processing cancelled cooperatively between frames
    #[error("Processing cancelled for analysis {0}")]
    Cancelled(uuid::Uuid),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
