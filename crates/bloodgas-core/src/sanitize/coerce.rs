//! Lenient readers over untrusted JSON objects. Only a missing key or
//! `null` counts as absent; present values are kept as given.

use serde_json::{Map, Value};

pub(crate) type Object = Map<String, Value>;

fn first<'a>(map: &'a Object, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find(|v| !v.is_null())
}

/// String slot; numbers and booleans are rendered as text.
pub(crate) fn text(map: &Object, keys: &[&str], default: &str) -> String {
    match first(map, keys) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => default.to_string(),
    }
}

/// Numeric slot; numeric strings are accepted, anything else is absent.
pub(crate) fn number(map: &Object, keys: &[&str]) -> Option<f64> {
    match first(map, keys)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Whole-unit count slot; fractional counts round up.
pub(crate) fn count(map: &Object, keys: &[&str]) -> Option<u32> {
    number(map, keys)
        .filter(|v| *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v.ceil() as u32)
}

/// List of strings; a single string becomes a one-item list.
pub(crate) fn strings(map: &Object, keys: &[&str]) -> Vec<String> {
    match first(map, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Nested object slot; an empty object counts as absent.
pub(crate) fn object<'a>(map: &'a Object, key: &str) -> Option<&'a Object> {
    match map.get(key) {
        Some(Value::Object(inner)) if !inner.is_empty() => Some(inner),
        _ => None,
    }
}

/// Array of objects; non-object items are dropped.
pub(crate) fn objects<'a>(map: &'a Object, key: &str) -> Vec<&'a Object> {
    match map.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Object {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_text_coercion() {
        let m = obj(json!({"a": "x", "b": 3, "c": true, "d": null, "e": [1]}));
        assert_eq!(text(&m, &["a"], "-"), "x");
        assert_eq!(text(&m, &["b"], "-"), "3");
        assert_eq!(text(&m, &["c"], "-"), "true");
        assert_eq!(text(&m, &["d"], "-"), "-");
        assert_eq!(text(&m, &["e"], "-"), "-");
        assert_eq!(text(&m, &["d", "a"], "-"), "x");
    }

    #[test]
    fn test_number_coercion() {
        let m = obj(json!({"a": 1.5, "b": "-12", "c": "twelve", "d": false}));
        assert_eq!(number(&m, &["a"]), Some(1.5));
        assert_eq!(number(&m, &["b"]), Some(-12.0));
        assert_eq!(number(&m, &["c"]), None);
        assert_eq!(number(&m, &["d"]), None);
        assert_eq!(number(&m, &["missing"]), None);
    }

    #[test]
    fn test_count_coercion() {
        let m = obj(json!({"a": 4, "b": 3.2, "c": -1}));
        assert_eq!(count(&m, &["a"]), Some(4));
        assert_eq!(count(&m, &["b"]), Some(4));
        assert_eq!(count(&m, &["c"]), None);
    }

    #[test]
    fn test_collections() {
        let m = obj(json!({"s": "one", "l": ["a", 2, {}], "o": {}, "arr": [{"x": 1}, 3]}));
        assert_eq!(strings(&m, &["s"]), vec!["one"]);
        assert_eq!(strings(&m, &["l"]), vec!["a", "2"]);
        assert!(object(&m, "o").is_none());
        assert_eq!(objects(&m, "arr").len(), 1);
    }
}
