//! Component catalogs.
//!
//! A catalog is a named vocabulary of component types, each described by a
//! JSON schema. Catalogs are validated against by the gateway before any
//! component reaches a client, and summarised for agents by [`describe`].

mod describe;
mod schema;
mod validator;

pub use describe::{describe, CatalogSummary, ComponentSummary, PropertySummary};
pub use schema::EffectiveSchema;
pub use validator::{validate, ValidationReport};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// A component vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Catalog id.
    #[serde(rename = "catalogId", alias = "id")]
    pub id: String,

    /// Human title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Component type name → JSON schema.
    #[serde(default)]
    pub components: BTreeMap<String, Value>,

    /// Functions callable from component properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Value>,

    /// Shared definitions referenced as `#/$defs/<name>`.
    #[serde(rename = "$defs", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defs: BTreeMap<String, Value>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            components: BTreeMap::new(),
            functions: Vec::new(),
            defs: BTreeMap::new(),
        }
    }

    /// Add a component schema.
    pub fn with_component(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.components.insert(name.into(), schema);
        self
    }

    /// Look up a component schema, ignoring case.
    pub fn component_schema(&self, type_name: &str) -> Option<(&str, &Value)> {
        self.components
            .get_key_value(type_name)
            .or_else(|| {
                self.components
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(type_name))
            })
            .map(|(name, schema)| (name.as_str(), schema))
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(Error::from)
    }

    /// Load every `*.json` catalog in a directory, skipping unreadable files.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        let mut catalogs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load(&path) {
                Ok(catalog) => {
                    debug!("Loaded catalog '{}' from {}", catalog.id, path.display());
                    catalogs.push(catalog);
                }
                Err(e) => warn!("Skipping catalog file {}: {}", path.display(), e),
            }
        }
        catalogs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(catalogs)
    }
}
