//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Unknown event kind string.
    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    /// Unknown chain status string.
    #[error("Unknown chain status: {0}")]
    UnknownChainStatus(String),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
