//! Error types for Freesail core.

use std::path::PathBuf;
use thiserror::Error;

/// Core result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Freesail core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Pointer error: {0}")]
    Pointer(#[from] PointerError),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON5 parse error: {0}")]
    Json5(String),
}

/// Errors produced by the streaming message parser.
///
/// Parse errors are reported alongside successfully parsed messages and never
/// abort the stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A balanced `{...}` span was found but was not valid JSON.
    #[error("Malformed JSON object: {message}")]
    Malformed {
        /// Decoder message.
        message: String,
        /// The offending fragment, truncated for logging.
        fragment: String,
    },

    /// Valid JSON that is not a recognised downstream frame.
    #[error("Unrecognised frame: {0}")]
    UnknownFrame(String),

    /// The pending buffer grew past the configured ceiling and was dropped.
    #[error("Parse buffer overflow: {size} bytes (max: {max} bytes)")]
    BufferOverflow {
        /// Buffer size when the overflow was detected.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },
}

/// Errors raised while walking or writing a JSON Pointer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PointerError {
    #[error("Invalid JSON pointer '{0}': must be empty or start with '/'")]
    Syntax(String),

    #[error("Invalid array index '{token}' in pointer '{pointer}'")]
    Index { pointer: String, token: String },

    #[error("Cannot descend into scalar value at '{0}'")]
    NotContainer(String),
}
