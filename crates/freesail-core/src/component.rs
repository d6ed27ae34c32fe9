//! Component records and their dynamic property values.
//!
//! Property values are stored unresolved. Bindings and template children are
//! evaluated against the data model only when a tree is traversed, so the
//! same component can be rendered against successive data snapshots.

use crate::pointer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// One node of a surface's component tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component id, unique within a surface.
    pub id: String,

    /// Catalog component type, e.g. `"Text"`.
    pub component: String,

    /// Single child reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,

    /// Ordered children or a data-driven template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Children>,

    /// Remaining catalog-defined properties.
    #[serde(flatten)]
    pub properties: BTreeMap<String, DynamicValue>,
}

impl Component {
    /// Create a component with no children or properties.
    pub fn new(id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component: component.into(),
            child: None,
            children: None,
            properties: BTreeMap::new(),
        }
    }

    /// Set a property.
    pub fn with_property(mut self, name: impl Into<String>, value: DynamicValue) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    /// Set the children.
    pub fn with_children(mut self, children: Children) -> Self {
        self.children = Some(children);
        self
    }

    /// Raw JSON form, as seen by the catalog validator.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Children of a container component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Children {
    /// Literal ordered list of component ids.
    Fixed(Vec<String>),

    /// Repeat one component per element found at a data path.
    Template(ChildTemplate),
}

/// A children template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildTemplate {
    /// Component instantiated once per element.
    pub template_component_id: String,

    /// Path of the collection, relative to the current scope unless absolute.
    pub data_path: String,
}

/// A property value: literal, data binding, or function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DynamicValue {
    Binding(Binding),
    FunctionCall(FunctionCall),
    Literal(Value),
}

impl DynamicValue {
    /// Literal value.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    /// Data binding to `path`.
    pub fn binding(path: impl Into<String>) -> Self {
        Self::Binding(Binding { path: path.into() })
    }
}

/// Reference into the data model, resolved at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Binding {
    pub path: String,
}

/// Call of a catalog-declared function, evaluated by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionCall {
    pub call: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub args: BTreeMap<String, DynamicValue>,
}

/// Whether a raw JSON value has the shape of a data binding (`{path: string}`).
pub fn is_binding(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get("path").is_some_and(Value::is_string),
        _ => false,
    }
}

/// Resolve a dynamic value to a plain value.
///
/// Absolute binding paths address the data model root; relative ones are
/// joined onto `scope`, the pointer of the current template element. Missing
/// paths resolve to `null`. Function calls resolve their arguments and are
/// returned as `{call, args}` for the renderer's function table.
pub fn resolve(value: &DynamicValue, data_model: &Value, scope: Option<&str>) -> Value {
    match value {
        DynamicValue::Literal(literal) => literal.clone(),
        DynamicValue::Binding(binding) => {
            let path = scoped_path(&binding.path, scope);
            pointer::get(data_model, &path).cloned().unwrap_or(Value::Null)
        }
        DynamicValue::FunctionCall(call) => {
            let args: Map<String, Value> = call
                .args
                .iter()
                .map(|(name, arg)| (name.clone(), resolve(arg, data_model, scope)))
                .collect();
            json!({ "call": call.call, "args": args })
        }
    }
}

/// Resolve every property of a component.
pub fn resolve_properties(
    component: &Component,
    data_model: &Value,
    scope: Option<&str>,
) -> Map<String, Value> {
    component
        .properties
        .iter()
        .map(|(name, value)| (name.clone(), resolve(value, data_model, scope)))
        .collect()
}

/// A child reference produced by traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    /// Component to render.
    pub component_id: String,

    /// Pointer of the template element the child is scoped to, if any.
    pub scope: Option<String>,
}

/// Expand a component's children against the current data model.
///
/// Fixed children inherit the parent's scope. A template yields one child per
/// element of the array (or entry of the object) found at its data path.
pub fn expand_children(
    component: &Component,
    data_model: &Value,
    scope: Option<&str>,
) -> Vec<ChildRef> {
    let inherited = scope.map(str::to_string);
    let mut out = Vec::new();

    if let Some(child) = &component.child {
        out.push(ChildRef {
            component_id: child.clone(),
            scope: inherited.clone(),
        });
    }

    match &component.children {
        None => {}
        Some(Children::Fixed(ids)) => {
            out.extend(ids.iter().map(|id| ChildRef {
                component_id: id.clone(),
                scope: inherited.clone(),
            }));
        }
        Some(Children::Template(template)) => {
            let base = scoped_path(&template.data_path, scope);
            let base = base.trim_end_matches('/');
            let keys: Vec<String> = match pointer::get(data_model, base) {
                Some(Value::Array(items)) => (0..items.len()).map(|i| i.to_string()).collect(),
                Some(Value::Object(map)) => map.keys().map(|k| pointer::escape(k)).collect(),
                _ => Vec::new(),
            };
            out.extend(keys.into_iter().map(|key| ChildRef {
                component_id: template.template_component_id.clone(),
                scope: Some(format!("{}/{}", base, key)),
            }));
        }
    }

    out
}

fn scoped_path(path: &str, scope: Option<&str>) -> String {
    match scope {
        Some(scope) => pointer::join(scope, path),
        None if path.starts_with('/') => path.to_string(),
        None => pointer::join("", path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_wire_shape() {
        let raw = json!({
            "id": "root",
            "component": "Column",
            "children": ["title", "list"],
            "align": "center",
            "label": {"path": "/title"},
            "visible": {"call": "not", "args": {"value": {"path": "/hidden"}}}
        });
        let component: Component = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(component.component, "Column");
        assert_eq!(
            component.children,
            Some(Children::Fixed(vec!["title".into(), "list".into()]))
        );
        assert_eq!(component.properties["align"], DynamicValue::literal("center"));
        assert_eq!(component.properties["label"], DynamicValue::binding("/title"));
        assert!(matches!(
            component.properties["visible"],
            DynamicValue::FunctionCall(_)
        ));
        assert_eq!(component.to_value(), raw);
    }

    #[test]
    fn test_object_with_extra_keys_is_literal() {
        let value: DynamicValue =
            serde_json::from_value(json!({"path": "/a", "label": "x"})).unwrap();
        assert!(matches!(value, DynamicValue::Literal(_)));
    }

    #[test]
    fn test_template_children_deserialize() {
        let component: Component = serde_json::from_value(json!({
            "id": "list",
            "component": "List",
            "children": {"templateComponentId": "row", "dataPath": "/items"}
        }))
        .unwrap();
        assert_eq!(
            component.children,
            Some(Children::Template(ChildTemplate {
                template_component_id: "row".into(),
                data_path: "/items".into(),
            }))
        );
    }

    #[test]
    fn test_resolve_binding_absolute_and_scoped() {
        let data = json!({"title": "Hi", "items": [{"name": "a"}, {"name": "b"}]});

        assert_eq!(resolve(&DynamicValue::binding("/title"), &data, None), json!("Hi"));
        assert_eq!(
            resolve(&DynamicValue::binding("name"), &data, Some("/items/1")),
            json!("b")
        );
        assert_eq!(resolve(&DynamicValue::binding("/missing"), &data, None), Value::Null);
        assert_eq!(resolve(&DynamicValue::literal(3), &data, None), json!(3));
    }

    #[test]
    fn test_resolve_function_call_resolves_args() {
        let data = json!({"count": 2});
        let call = DynamicValue::FunctionCall(FunctionCall {
            call: "formatNumber".into(),
            args: BTreeMap::from([("value".to_string(), DynamicValue::binding("/count"))]),
        });
        assert_eq!(
            resolve(&call, &data, None),
            json!({"call": "formatNumber", "args": {"value": 2}})
        );
    }

    #[test]
    fn test_expand_template_children_tracks_data() {
        let list = Component::new("list", "List").with_children(Children::Template(ChildTemplate {
            template_component_id: "row".into(),
            data_path: "/items".into(),
        }));

        let data = json!({"items": [{"name": "a"}, {"name": "b"}]});
        let children = expand_children(&list, &data, None);
        assert_eq!(children.len(), 2);
        assert_eq!(children[1].component_id, "row");
        assert_eq!(children[1].scope.as_deref(), Some("/items/1"));

        // no memoization across data changes
        let data = json!({"items": []});
        assert!(expand_children(&list, &data, None).is_empty());
    }

    #[test]
    fn test_expand_fixed_children_inherit_scope() {
        let row = Component::new("row", "Row")
            .with_children(Children::Fixed(vec!["name".into(), "done".into()]));
        let children = expand_children(&row, &json!({}), Some("/items/0"));
        assert_eq!(
            children,
            vec![
                ChildRef { component_id: "name".into(), scope: Some("/items/0".into()) },
                ChildRef { component_id: "done".into(), scope: Some("/items/0".into()) },
            ]
        );
    }

    #[test]
    fn test_nested_template_relative_path() {
        let inner = Component::new("tags", "List").with_children(Children::Template(ChildTemplate {
            template_component_id: "tag".into(),
            data_path: "tags".into(),
        }));
        let data = json!({"items": [{"tags": ["x", "y", "z"]}]});
        let children = expand_children(&inner, &data, Some("/items/0"));
        assert_eq!(children.len(), 3);
        assert_eq!(children[2].scope.as_deref(), Some("/items/0/tags/2"));
    }

    #[test]
    fn test_is_binding() {
        assert!(is_binding(&json!({"path": "/a"})));
        assert!(!is_binding(&json!({"path": 3})));
        assert!(!is_binding(&json!({"path": "/a", "x": 1})));
        assert!(!is_binding(&json!("/a")));
    }
}
