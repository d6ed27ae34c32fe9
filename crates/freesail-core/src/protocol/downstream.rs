//! Gateway → client frames.

use crate::component::Component;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A protocol frame pushed to a client.
///
/// Serialized externally tagged, e.g. `{"createSurface": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownstreamMessage {
    CreateSurface(CreateSurface),
    UpdateComponents(UpdateComponents),
    UpdateDataModel(UpdateDataModel),
    DeleteSurface(DeleteSurface),
}

impl DownstreamMessage {
    /// Surface the frame applies to.
    pub fn surface_id(&self) -> &str {
        match self {
            Self::CreateSurface(m) => &m.surface_id,
            Self::UpdateComponents(m) => &m.surface_id,
            Self::UpdateDataModel(m) => &m.surface_id,
            Self::DeleteSurface(m) => &m.surface_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSurface {
    pub surface_id: String,
    pub catalog_id: String,

    /// Ask the client to attach the full data model to every action.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub send_data_model: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComponents {
    pub surface_id: String,
    pub components: Vec<Component>,
}

/// Data model patch.
///
/// A missing `path` addresses the whole model. A missing `value` deletes the
/// addressed location; an explicit `null` stores `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDataModel {
    pub surface_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSurface {
    pub surface_id: String,
}

fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
