//! Error types for nexos-bridge

use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors (missing credentials, bad addresses, unreadable files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream (nexos.ai) communication errors
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Session pointer persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Server/HTTP errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
