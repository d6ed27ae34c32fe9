//! Wire protocol between gateway, clients, and agents.
//!
//! - **Downstream** frames (gateway → client) are newline-delimited JSON on
//!   the client stream, preceded by a [`Handshake`].
//! - **Upstream** messages (client → gateway) are actions and errors.
//! - **Operation errors** are the structured failures returned to agents.

pub mod codec;
mod downstream;
mod upstream;

pub use codec::{encode, ParseOutput, StreamParser};
pub use downstream::*;
pub use upstream::*;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// HTTP header carrying the session id on upstream requests.
pub const SESSION_HEADER: &str = "x-session-id";

/// First frame of every client stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub connected: bool,
    pub session_id: String,
}

impl Handshake {
    /// Handshake announcing `session_id`.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            connected: true,
            session_id: session_id.into(),
        }
    }
}

/// Any frame a client may read from its stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    Handshake(Handshake),
    Message(DownstreamMessage),
}

/// Error codes shared by gateway results and renderer reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SurfaceNotFound,
    ComponentRenderFailed,
    ValidationFailed,
    SessionNotFound,
    CatalogNotAllowed,
    AlreadyClaimed,
    InvalidPath,
    SurfaceNotOwned,
}

impl ErrorCode {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SurfaceNotFound => "SURFACE_NOT_FOUND",
            Self::ComponentRenderFailed => "COMPONENT_RENDER_FAILED",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::CatalogNotAllowed => "CATALOG_NOT_ALLOWED",
            Self::AlreadyClaimed => "ALREADY_CLAIMED",
            Self::InvalidPath => "INVALID_PATH",
            Self::SurfaceNotOwned => "SURFACE_NOT_OWNED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain failure returned to the caller as a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,

    /// Per-field details, e.g. validation messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl OperationError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    pub fn surface_not_found(surface_id: &str) -> Self {
        Self::new(
            ErrorCode::SurfaceNotFound,
            format!("Surface '{}' not found", surface_id),
        )
    }

    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(
            ErrorCode::SessionNotFound,
            format!("Session '{}' not found", session_id),
        )
    }

    pub fn surface_not_owned(surface_id: &str, session_id: &str) -> Self {
        Self::new(
            ErrorCode::SurfaceNotOwned,
            format!(
                "Surface '{}' is owned by another session than '{}'",
                surface_id, session_id
            ),
        )
    }

    /// `{success: false, error: {...}}` result body.
    pub fn to_result(&self) -> Value {
        json!({ "success": false, "error": self })
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for OperationError {}
