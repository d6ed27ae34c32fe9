//! Client → gateway messages.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action name enqueued when a client session connects.
pub const SESSION_CONNECTED: &str = "__session_connected";

/// Action name broadcast to remaining sessions when a client leaves.
pub const SESSION_DISCONNECTED: &str = "__session_disconnected";

/// An upstream event, serialized as `{"action": {...}}` or `{"error": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpstreamMessage {
    Action(UserAction),
    Error(ClientError),
}

impl UpstreamMessage {
    /// Surface the event originated from (empty for synthetic actions).
    pub fn surface_id(&self) -> &str {
        match self {
            Self::Action(action) => &action.surface_id,
            Self::Error(error) => &error.surface_id,
        }
    }

    /// Whether this is a gateway-generated lifecycle action.
    pub fn is_synthetic(&self) -> bool {
        matches!(self, Self::Action(action) if action.name.starts_with("__"))
    }
}

/// A user interaction reported by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub name: String,
    pub surface_id: String,
    pub source_component_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl UserAction {
    /// Build a gateway-generated lifecycle action.
    pub fn synthetic(name: &str, context: Map<String, Value>) -> Self {
        Self {
            name: name.to_string(),
            surface_id: String::new(),
            source_component_id: String::new(),
            timestamp: crate::id::timestamp(),
            context,
        }
    }
}

/// An error reported by the renderer, e.g. `COMPONENT_RENDER_FAILED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub surface_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
