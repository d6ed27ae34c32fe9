//! Surface Store: component trees and data models per surface.

use crate::events::{EventBus, SurfaceEvent};
use chrono::{DateTime, Utc};
use freesail_core::component::Component;
use freesail_core::error::PointerError;
use freesail_core::pointer;
use freesail_core::protocol::ErrorCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Component id that always becomes the root when present.
pub const ROOT_COMPONENT_ID: &str = "root";

/// One UI region.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Surface {
    pub id: String,
    pub catalog_id: String,
    pub components: BTreeMap<String, Component>,
    pub root_id: Option<String>,
    pub data_model: Value,
    pub send_data_model: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Surface {
    fn new(id: &str, catalog_id: &str, send_data_model: bool, theme: Option<Value>) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            catalog_id: catalog_id.to_string(),
            components: BTreeMap::new(),
            root_id: None,
            data_model: Value::Object(Map::new()),
            send_data_model,
            theme,
            created_at: now,
            updated_at: now,
        }
    }

    /// The designated root component, if any.
    pub fn root(&self) -> Option<&Component> {
        self.root_id.as_ref().and_then(|id| self.components.get(id))
    }
}

/// In-memory store of surfaces.
#[derive(Default)]
pub struct SurfaceStore {
    surfaces: HashMap<String, Surface>,
    events: EventBus<SurfaceEvent>,
}

impl SurfaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Event bus for store changes.
    pub fn events(&self) -> &EventBus<SurfaceEvent> {
        &self.events
    }

    /// Create a surface, or update the fields of an existing one.
    ///
    /// `None` leaves an existing field untouched. Returns `true` when the
    /// surface was created.
    pub fn create_or_update(
        &mut self,
        surface_id: &str,
        catalog_id: &str,
        send_data_model: Option<bool>,
        theme: Option<Value>,
    ) -> bool {
        if let Some(surface) = self.surfaces.get_mut(surface_id) {
            let mut changed = false;
            if surface.catalog_id != catalog_id {
                surface.catalog_id = catalog_id.to_string();
                changed = true;
            }
            if let Some(flag) = send_data_model {
                if surface.send_data_model != flag {
                    surface.send_data_model = flag;
                    changed = true;
                }
            }
            if theme.is_some() && surface.theme != theme {
                surface.theme = theme;
                changed = true;
            }
            if changed {
                surface.updated_at = Utc::now();
                self.events.emit(&SurfaceEvent::Updated {
                    surface_id: surface_id.to_string(),
                });
            }
            return false;
        }

        let surface = Surface::new(
            surface_id,
            catalog_id,
            send_data_model.unwrap_or(false),
            theme,
        );
        self.surfaces.insert(surface_id.to_string(), surface);
        debug!("Surface created: {} (catalog {})", surface_id, catalog_id);
        self.events.emit(&SurfaceEvent::Created {
            surface_id: surface_id.to_string(),
            catalog_id: catalog_id.to_string(),
        });
        true
    }

    /// Merge components into a surface's tree by id.
    ///
    /// A component with id `"root"` becomes the root once seen and is never
    /// displaced. Without one, the first component ever written is the root.
    pub fn replace_components(&mut self, surface_id: &str, components: Vec<Component>) -> bool {
        let Some(surface) = self.surfaces.get_mut(surface_id) else {
            self.not_found(surface_id);
            return false;
        };

        let count = components.len();
        for component in components {
            let is_root = component.id == ROOT_COMPONENT_ID;
            if is_root || surface.root_id.is_none() {
                surface.root_id = Some(component.id.clone());
            }
            surface.components.insert(component.id.clone(), component);
        }
        surface.updated_at = Utc::now();

        self.events.emit(&SurfaceEvent::ComponentsReplaced {
            surface_id: surface_id.to_string(),
            count,
        });
        true
    }

    /// Patch the data model at a JSON pointer.
    ///
    /// The root pointer (`""` or `"/"`) replaces the whole model, and `None`
    /// resets it to `{}`. Any other pointer sets the leaf, creating missing
    /// levels, or deletes it when `value` is `None`. Returns `Ok(false)` for an
    /// unknown surface.
    pub fn patch_data(
        &mut self,
        surface_id: &str,
        path: &str,
        value: Option<Value>,
    ) -> Result<bool, PointerError> {
        let Some(surface) = self.surfaces.get_mut(surface_id) else {
            self.not_found(surface_id);
            return Ok(false);
        };

        match value {
            Some(value) => pointer::set(&mut surface.data_model, path, value)?,
            None => {
                pointer::remove(&mut surface.data_model, path)?;
            }
        }
        surface.updated_at = Utc::now();

        self.events.emit(&SurfaceEvent::DataPatched {
            surface_id: surface_id.to_string(),
            path: path.to_string(),
        });
        Ok(true)
    }

    /// Remove a surface.
    pub fn delete(&mut self, surface_id: &str) -> bool {
        if self.surfaces.remove(surface_id).is_none() {
            self.not_found(surface_id);
            return false;
        }
        debug!("Surface deleted: {}", surface_id);
        self.events.emit(&SurfaceEvent::Deleted {
            surface_id: surface_id.to_string(),
        });
        true
    }

    pub fn get(&self, surface_id: &str) -> Option<&Surface> {
        self.surfaces.get(surface_id)
    }

    pub fn contains(&self, surface_id: &str) -> bool {
        self.surfaces.contains_key(surface_id)
    }

    /// Data models of every surface that publishes its state with actions.
    pub fn get_all_sendable(&self) -> BTreeMap<String, Value> {
        self.surfaces
            .values()
            .filter(|s| s.send_data_model)
            .map(|s| (s.id.clone(), s.data_model.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    fn not_found(&self, surface_id: &str) {
        debug!("Surface not found: {}", surface_id);
        self.events.emit(&SurfaceEvent::Error {
            code: ErrorCode::SurfaceNotFound,
            surface_id: surface_id.to_string(),
            message: format!("Surface '{}' not found", surface_id),
        });
    }
}
