//! Error types for tutorlog-core

use thiserror::Error;

/// Main error type for the tutorlog-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The export file could not be read as a list of log records
    #[error("invalid input in {source_name}: {message}")]
    Input {
        source_name: String,
        message: String,
    },
}

/// Result type alias for tutorlog-core
pub type Result<T> = std::result::Result<T, Error>;
