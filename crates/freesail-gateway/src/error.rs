//! Gateway error types.

use freesail_core::protocol::{ErrorCode, OperationError};
use thiserror::Error;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error(transparent)]
    Core(#[from] freesail_core::Error),

    /// Method not found.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session claimed by another agent, or surface owned by another session.
    #[error("Claim conflict: {0}")]
    ClaimConflict(String),

    /// Output channel closed or refused a frame.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Connection limit reached.
    #[error("Too many sessions: {0}")]
    Capacity(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Get the JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) => -32602,
            Self::Json(_) => -32700,
            Self::NotFound(_) => -32002,
            Self::ClaimConflict(_) => -32003,
            _ => -32603,
        }
    }
}

impl From<OperationError> for GatewayError {
    fn from(err: OperationError) -> Self {
        match err.code {
            ErrorCode::SurfaceNotFound | ErrorCode::SessionNotFound => Self::NotFound(err.message),
            ErrorCode::AlreadyClaimed | ErrorCode::SurfaceNotOwned => {
                Self::ClaimConflict(err.message)
            }
            ErrorCode::ValidationFailed | ErrorCode::CatalogNotAllowed | ErrorCode::InvalidPath => {
                Self::InvalidParams(err.message)
            }
            ErrorCode::ComponentRenderFailed => Self::Internal(err.message),
        }
    }
}
