//! Instance validation against a catalog component schema.
//!
//! This is a best-effort check, not a JSON Schema implementation: required
//! properties, array item shapes, and `oneOf` alternatives. Data bindings are
//! exempt from type checks because their value is only known at render time.

use super::schema::{declared_types, is_binding_schema, resolve_ref, value_has_type};
use super::{Catalog, EffectiveSchema};
use crate::component::is_binding;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Property that names the component type; never required of instances.
const TYPE_PROPERTY: &str = "component";

/// Outcome of validating one component instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Validate a raw component instance against `component_type` in `catalog`.
pub fn validate(catalog: &Catalog, component_type: &str, instance: &Value) -> ValidationReport {
    let Some((type_name, schema)) = catalog.component_schema(component_type) else {
        return ValidationReport::from_errors(vec![format!(
            "Unknown component type '{}' in catalog '{}'",
            component_type, catalog.id
        )]);
    };

    let Some(props) = instance.as_object() else {
        return ValidationReport::from_errors(vec![format!(
            "{} instance must be a JSON object",
            type_name
        )]);
    };

    let effective = EffectiveSchema::flatten(catalog, schema);

    // Pass 1: required properties on the raw instance.
    let missing: Vec<String> = effective
        .required
        .iter()
        .filter(|name| name.as_str() != TYPE_PROPERTY && !props.contains_key(name.as_str()))
        .map(|name| format!("{}: missing required property '{}'", type_name, name))
        .collect();
    if !missing.is_empty() {
        return ValidationReport::from_errors(missing);
    }

    // Pass 2: shape checks on declared properties.
    let mut errors = Vec::new();
    for (name, value) in props {
        let Some(property) = effective.properties.get(name) else {
            continue;
        };
        if binding_exempt(value) {
            continue;
        }
        let property = resolve_ref(catalog, property);
        let label = format!("{}.{}", type_name, name);

        if let Some(branches) = property.get("oneOf").and_then(Value::as_array) {
            let matched = branches
                .iter()
                .any(|branch| branch_matches(catalog, resolve_ref(catalog, branch), value));
            if !matched {
                let shapes: Vec<String> = branches
                    .iter()
                    .map(|branch| describe_shape(catalog, resolve_ref(catalog, branch)))
                    .collect();
                errors.push(format!(
                    "{}: value does not match any allowed shape ({})",
                    label,
                    shapes.join(" | ")
                ));
            }
        } else if declared_types(property).contains(&"array") {
            check_array(catalog, &label, property, value, &mut errors);
        }
    }

    ValidationReport::from_errors(errors)
}

/// Bindings, and arrays carrying a binding, are resolved at render time.
fn binding_exempt(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(is_binding),
        other => is_binding(other),
    }
}

fn branch_matches(catalog: &Catalog, branch: &Value, value: &Value) -> bool {
    if is_binding_schema(catalog, branch) {
        return is_binding(value);
    }
    let types = declared_types(branch);
    if types.contains(&"array") {
        if !value.is_array() {
            return false;
        }
        let mut errors = Vec::new();
        check_array(catalog, "", branch, value, &mut errors);
        return errors.is_empty();
    }
    types.is_empty() || types.iter().any(|ty| value_has_type(value, ty))
}

fn describe_shape(catalog: &Catalog, branch: &Value) -> String {
    if is_binding_schema(catalog, branch) {
        return "data binding {path}".to_string();
    }
    let types = declared_types(branch);
    if types.is_empty() {
        "any".to_string()
    } else {
        types.join("/")
    }
}

fn check_array(
    catalog: &Catalog,
    label: &str,
    schema: &Value,
    value: &Value,
    errors: &mut Vec<String>,
) {
    let Some(elements) = value.as_array() else {
        errors.push(format!("{}: expected an array", label));
        return;
    };
    let Some(items) = schema.get("items").map(|items| resolve_ref(catalog, items)) else {
        return;
    };

    let item_schema = EffectiveSchema::flatten(catalog, items);
    let object_items =
        declared_types(items).contains(&"object") || !item_schema.properties.is_empty();
    if !object_items {
        return;
    }

    for (index, element) in elements.iter().enumerate() {
        let Some(fields) = element.as_object() else {
            errors.push(format!("{}[{}]: expected an object", label, index));
            continue;
        };
        for required in &item_schema.required {
            if !fields.contains_key(required.as_str()) {
                errors.push(format!(
                    "{}[{}]: missing required field '{}'",
                    label, index, required
                ));
            }
        }
    }
}
