//! Error types for Tollgate.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// The limiter was constructed with a zero limit or an empty window
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The caller's wait for a permit was interrupted; no permit was granted
    #[error("Permit acquisition cancelled")]
    Cancelled,

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status
    #[error("Request rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the service
        body: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
