//! Helpers over untyped JSON option values.
//!
//! Rule-specific options are free-form, so they travel as `serde_json` maps and
//! are layered with [`merge`].

use serde_json::{Map, Value};

/// Deep-merges every source into `target`, left to right.
///
/// Object values recurse, replacing a primitive or absent target value with a
/// fresh object first. `null` source values are skipped. Every other value,
/// arrays included, overwrites the target value wholesale.
pub fn merge<'a>(target: &mut Value, sources: impl IntoIterator<Item = &'a Value>) {
    for source in sources {
        merge_value(target, source);
    }
}

/// Deep-merges `source` into the `target` map. Same rules as [`merge`].
pub fn merge_map(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match value {
            Value::Null => {}
            Value::Object(_) => merge_value(target.entry(key.clone()).or_insert(Value::Null), value),
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

fn merge_value(target: &mut Value, source: &Value) {
    match source {
        Value::Null => {}
        Value::Object(source) => {
            if !target.is_object() {
                *target = Value::Object(Map::new());
            }
            if let Value::Object(target) = target {
                merge_map(target, source);
            }
        }
        other => *target = other.clone(),
    }
}

/// Returns true for values that are not containers (null, booleans, numbers,
/// strings).
pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Returns the position of `value` in `source`, or `None` when `source` is
/// not an array or does not contain it.
pub fn index_of(value: &Value, source: &Value) -> Option<usize> {
    match source {
        Value::Array(items) => items.iter().position(|item| item == value),
        _ => None,
    }
}

/// Returns true for primitives (falsy values such as `null`, `false`, zero and
/// the empty string included), empty arrays, and objects whose values are all
/// `null`.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(Value::is_null),
        _ => true,
    }
}
