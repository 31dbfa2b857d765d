//! Error types for HuePair

use thiserror::Error;

/// Main error type for HuePair core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid symbol {0:?}: symbols must be single ASCII letters or digits")]
    InvalidSymbol(char),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using HuePair's Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Create a sequence decoding error
    pub fn invalid_sequence(message: impl Into<String>) -> Self {
        Error::InvalidSequence(message.into())
    }
}
