//! Schema flattening shared by the validator and the describer.

use super::Catalog;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const MAX_DEPTH: usize = 16;

/// Properties and required names merged across an `allOf` chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveSchema {
    pub properties: Map<String, Value>,
    pub required: BTreeSet<String>,
}

impl EffectiveSchema {
    /// Flatten `schema`, resolving local `$ref`s against the catalog.
    pub fn flatten(catalog: &Catalog, schema: &Value) -> Self {
        let mut out = Self::default();
        flatten_into(catalog, schema, &mut out, 0);
        out
    }
}

fn flatten_into(catalog: &Catalog, schema: &Value, out: &mut EffectiveSchema, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    let schema = resolve_ref(catalog, schema);

    if let Some(parts) = schema.get("allOf").and_then(Value::as_array) {
        for part in parts {
            flatten_into(catalog, part, out, depth + 1);
        }
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            out.properties.insert(name.clone(), property.clone());
        }
    }
    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        out.required
            .extend(required.iter().filter_map(Value::as_str).map(str::to_string));
    }
}

/// Follow `{"$ref": "...#/$defs/<name>"}` chains into the catalog's `$defs`.
///
/// Unresolvable references are returned unchanged.
pub(crate) fn resolve_ref<'a>(catalog: &'a Catalog, schema: &'a Value) -> &'a Value {
    let mut current = schema;
    for _ in 0..MAX_DEPTH {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            break;
        };
        let Some((_, name)) = reference.rsplit_once("/$defs/") else {
            break;
        };
        match catalog.defs.get(name) {
            Some(target) => current = target,
            None => break,
        }
    }
    current
}

/// Declared JSON types of a schema (`type` may be a string or a list).
pub(crate) fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Whether the schema describes a `{path}` data binding.
pub(crate) fn is_binding_schema(catalog: &Catalog, schema: &Value) -> bool {
    let flat = EffectiveSchema::flatten(catalog, schema);
    flat.properties.contains_key("path")
        && flat.properties.len() <= 1
        && !declared_types(schema).contains(&"array")
}

/// Whether a JSON value has the given JSON-schema type.
pub(crate) fn value_has_type(value: &Value, ty: &str) -> bool {
    match ty {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_merges_all_of_chain() {
        let mut catalog = Catalog::new("c");
        catalog.defs.insert(
            "Common".into(),
            json!({"properties": {"id": {}, "weight": {}}, "required": ["id"]}),
        );
        let schema = json!({
            "allOf": [
                {"$ref": "common.json#/$defs/Common"},
                {"allOf": [{"properties": {"label": {}}, "required": ["label"]}]}
            ],
            "properties": {"text": {}},
            "required": ["text"]
        });

        let flat = EffectiveSchema::flatten(&catalog, &schema);
        let props: Vec<_> = flat.properties.keys().cloned().collect();
        assert_eq!(props.len(), 4);
        for name in ["id", "weight", "label", "text"] {
            assert!(flat.properties.contains_key(name), "{}", name);
        }
        assert_eq!(
            flat.required.into_iter().collect::<Vec<_>>(),
            vec!["id", "label", "text"]
        );
    }

    #[test]
    fn test_self_referencing_def_terminates() {
        let mut catalog = Catalog::new("c");
        catalog.defs.insert("Loop".into(), json!({"$ref": "#/$defs/Loop"}));
        let flat = EffectiveSchema::flatten(&catalog, &json!({"$ref": "#/$defs/Loop"}));
        assert!(flat.properties.is_empty());
    }

    #[test]
    fn test_declared_types() {
        assert_eq!(declared_types(&json!({"type": "array"})), vec!["array"]);
        assert_eq!(
            declared_types(&json!({"type": ["string", "null"]})),
            vec!["string", "null"]
        );
        assert!(declared_types(&json!({})).is_empty());
    }
}
