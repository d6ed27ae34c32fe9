//! JSON Pointer (RFC 6901) helpers for addressing the surface data model.
//!
//! Writes create missing intermediate levels as empty objects. The pointers
//! `""` and `"/"` both address the whole document.

use crate::error::PointerError;
use serde_json::{Map, Value};

/// Split a pointer into unescaped reference tokens.
pub fn parse(pointer: &str) -> Result<Vec<String>, PointerError> {
    if is_root(pointer) {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| PointerError::Syntax(pointer.to_string()))?;

    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Whether the pointer addresses the whole document.
pub fn is_root(pointer: &str) -> bool {
    pointer.is_empty() || pointer == "/"
}

/// Escape a single key for use as a pointer token.
pub fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Join a relative path onto a base pointer.
///
/// Absolute paths (leading `/`) ignore the base; `""` and `"."` return it.
pub fn join(base: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        return relative.to_string();
    }
    let relative = relative.trim_start_matches("./");
    if relative.is_empty() || relative == "." {
        return base.to_string();
    }
    let base = base.trim_end_matches('/');
    format!("{}/{}", base, relative)
}

/// Read the value at `pointer`.
pub fn get<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    let tokens = parse(pointer).ok()?;
    let mut current = root;
    for token in &tokens {
        current = match current {
            Value::Object(map) => map.get(token)?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `pointer`, creating intermediate objects as needed.
pub fn set(root: &mut Value, pointer: &str, value: Value) -> Result<(), PointerError> {
    let tokens = parse(pointer)?;
    let Some((last, parents)) = tokens.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut current = root;
    for token in parents {
        current = descend_or_create(current, token, pointer)?;
    }

    if !current.is_object() && !current.is_array() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last, items.len(), pointer)?;
            if index == items.len() {
                items.push(value);
            } else {
                items[index] = value;
            }
            Ok(())
        }
        _ => Err(PointerError::NotContainer(pointer.to_string())),
    }
}

/// Remove the value at `pointer`, returning it if present.
///
/// Removing the root resets the document to an empty object.
pub fn remove(root: &mut Value, pointer: &str) -> Result<Option<Value>, PointerError> {
    let tokens = parse(pointer)?;
    let Some((last, parents)) = tokens.split_last() else {
        let previous = std::mem::replace(root, Value::Object(Map::new()));
        return Ok(Some(previous));
    };

    let mut current = root;
    for token in parents {
        let next = match current {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => match token.parse::<usize>() {
                Ok(index) => items.get_mut(index),
                Err(_) => None,
            },
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }

    Ok(match current {
        Value::Object(map) => map.remove(last),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => Some(items.remove(index)),
            _ => None,
        },
        _ => None,
    })
}

fn descend_or_create<'a>(
    current: &'a mut Value,
    token: &str,
    pointer: &str,
) -> Result<&'a mut Value, PointerError> {
    if !current.is_object() && !current.is_array() {
        *current = Value::Object(Map::new());
    }

    match current {
        Value::Object(map) => {
            let slot = map
                .entry(token.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() && !slot.is_array() {
                *slot = Value::Object(Map::new());
            }
            Ok(slot)
        }
        Value::Array(items) => {
            let index = array_index(token, items.len(), pointer)?;
            if index == items.len() {
                items.push(Value::Object(Map::new()));
            }
            Ok(&mut items[index])
        }
        _ => Err(PointerError::NotContainer(pointer.to_string())),
    }
}

fn array_index(token: &str, len: usize, pointer: &str) -> Result<usize, PointerError> {
    if token == "-" {
        return Ok(len);
    }
    match token.parse::<usize>() {
        Ok(index) if index <= len => Ok(index),
        _ => Err(PointerError::Index {
            pointer: pointer.to_string(),
            token: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_unescapes_tokens() {
        assert_eq!(parse("").unwrap(), Vec::<String>::new());
        assert_eq!(parse("/").unwrap(), Vec::<String>::new());
        assert_eq!(parse("/a~1b/c~0d").unwrap(), vec!["a/b", "c~d"]);
        assert!(matches!(parse("nope"), Err(PointerError::Syntax(_))));
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({});
        set(&mut doc, "/user/address/city", json!("Oslo")).unwrap();
        assert_eq!(doc, json!({"user": {"address": {"city": "Oslo"}}}));
        assert_eq!(get(&doc, "/user/address/city"), Some(&json!("Oslo")));
    }

    #[test]
    fn test_set_replaces_scalar_intermediate() {
        let mut doc = json!({"user": "anonymous"});
        set(&mut doc, "/user/name", json!("Ada")).unwrap();
        assert_eq!(doc, json!({"user": {"name": "Ada"}}));
    }

    #[test]
    fn test_set_root_replaces_document() {
        let mut doc = json!({"a": 1});
        set(&mut doc, "/", json!({"b": 2})).unwrap();
        assert_eq!(doc, json!({"b": 2}));
    }

    #[test]
    fn test_set_into_arrays() {
        let mut doc = json!({"items": [{"done": false}]});
        set(&mut doc, "/items/0/done", json!(true)).unwrap();
        set(&mut doc, "/items/-", json!({"done": false})).unwrap();
        assert_eq!(doc, json!({"items": [{"done": true}, {"done": false}]}));

        let err = set(&mut doc, "/items/7", json!(1)).unwrap_err();
        assert!(matches!(err, PointerError::Index { .. }));
    }

    #[test]
    fn test_remove_leaf_and_root() {
        let mut doc = json!({"a": {"b": 1, "c": 2}, "list": [1, 2, 3]});
        assert_eq!(remove(&mut doc, "/a/b").unwrap(), Some(json!(1)));
        assert_eq!(remove(&mut doc, "/list/1").unwrap(), Some(json!(2)));
        assert_eq!(remove(&mut doc, "/missing/x").unwrap(), None);
        assert_eq!(doc, json!({"a": {"c": 2}, "list": [1, 3]}));

        remove(&mut doc, "").unwrap();
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/items/0", "name"), "/items/0/name");
        assert_eq!(join("/items/0/", "./name"), "/items/0/name");
        assert_eq!(join("/items/0", "/title"), "/title");
        assert_eq!(join("/items/0", "."), "/items/0");
        assert_eq!(join("", "name"), "/name");
    }
}
