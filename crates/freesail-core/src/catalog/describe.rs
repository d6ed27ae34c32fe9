//! Structured catalog summaries for agents.

use super::schema::{declared_types, is_binding_schema, resolve_ref};
use super::{Catalog, EffectiveSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Summary of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSummary {
    pub catalog_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub components: Vec<ComponentSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<Value>,
}

/// Summary of one component type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<PropertySummary>,
}

/// Summary of one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub name: String,
    pub required: bool,
    /// Accepted shapes, e.g. `"string | binding"`.
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// Summarise a catalog's components and properties.
///
/// The `component` type tag is omitted from property lists; it is implied by
/// the component name.
pub fn describe(catalog: &Catalog) -> CatalogSummary {
    let components = catalog
        .components
        .iter()
        .map(|(name, schema)| {
            let effective = EffectiveSchema::flatten(catalog, schema);
            let properties = effective
                .properties
                .iter()
                .filter(|(prop, _)| prop.as_str() != "component")
                .map(|(prop, property)| {
                    let property = resolve_ref(catalog, property);
                    PropertySummary {
                        name: prop.clone(),
                        required: effective.required.contains(prop),
                        kind: kind_of(catalog, property),
                        description: text(property, "description"),
                        enum_values: property
                            .get("enum")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default(),
                        default: property.get("default").cloned(),
                    }
                })
                .collect();

            ComponentSummary {
                name: name.clone(),
                description: text(resolve_ref(catalog, schema), "description"),
                properties,
            }
        })
        .collect();

    CatalogSummary {
        catalog_id: catalog.id.clone(),
        title: catalog.title.clone(),
        description: catalog.description.clone(),
        components,
        functions: catalog.functions.clone(),
    }
}

fn kind_of(catalog: &Catalog, property: &Value) -> String {
    if let Some(branches) = property.get("oneOf").and_then(Value::as_array) {
        let kinds: Vec<String> = branches
            .iter()
            .map(|branch| kind_of(catalog, resolve_ref(catalog, branch)))
            .collect();
        return kinds.join(" | ");
    }
    if is_binding_schema(catalog, property) {
        return "binding".to_string();
    }
    let types = declared_types(property);
    if types.is_empty() {
        "any".to_string()
    } else {
        types.join("/")
    }
}

fn text(schema: &Value, key: &str) -> Option<String> {
    schema.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_flattens_and_marks_required() {
        let mut catalog = Catalog::new("cat1").with_component(
            "Button",
            json!({
                "description": "A clickable button",
                "allOf": [{"$ref": "#/$defs/Common"}],
                "properties": {
                    "component": {"const": "Button"},
                    "label": {"oneOf": [{"type": "string"}, {"$ref": "#/$defs/Binding"}]},
                    "variant": {"type": "string", "enum": ["primary", "text"], "default": "primary"}
                },
                "required": ["component", "label"]
            }),
        );
        catalog.defs.insert(
            "Common".into(),
            json!({"properties": {"id": {"type": "string", "description": "Unique id"}}, "required": ["id"]}),
        );
        catalog.defs.insert(
            "Binding".into(),
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        );

        let summary = describe(&catalog);
        assert_eq!(summary.catalog_id, "cat1");
        let button = &summary.components[0];
        assert_eq!(button.description.as_deref(), Some("A clickable button"));

        let names: Vec<_> = button.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id", "label", "variant"]);

        let label = &button.properties[1];
        assert!(label.required);
        assert_eq!(label.kind, "string | binding");

        let variant = &button.properties[2];
        assert!(!variant.required);
        assert_eq!(variant.enum_values, vec![json!("primary"), json!("text")]);
        assert_eq!(variant.default, Some(json!("primary")));

        assert_eq!(button.properties[0].description.as_deref(), Some("Unique id"));
    }
}
