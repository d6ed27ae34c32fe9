//! Error types for the client transport.

use thiserror::Error;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Transport error types.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network error.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success status from the gateway.
    #[error("Gateway returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Invalid gateway URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stream ended or failed.
    #[error("Stream error: {0}")]
    Stream(String),
}

impl TransportError {
    /// Create a stream error.
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }
}
