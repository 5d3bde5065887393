//! Order-insensitive document comparison for the update idempotence check.

use serde_json::Value;

/// Whether two documents are semantically equal: object key order is
/// irrelevant and arrays compare as multisets.
#[must_use]
pub fn canonical_eq(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Rewrite `value` into a canonical form: arrays sorted by the canonical
/// serialization of their elements. Objects need no rewrite beyond their
/// values, the map representation is already key-ordered.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut canonical: Vec<Value> = items.iter().map(canonicalize).collect();
            canonical.sort_by_cached_key(|v| v.to_string());
            Value::Array(canonical)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect(),
        ),
        leaf => leaf.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_is_irrelevant() {
        let a = json!({"size": 1, "plan": "small"});
        let b = json!({"plan": "small", "size": 1});
        assert!(canonical_eq(&a, &b));
    }

    #[test]
    fn arrays_compare_as_multisets() {
        assert!(canonical_eq(&json!([1, 2, 2]), &json!([2, 1, 2])));
        assert!(!canonical_eq(&json!([1, 2]), &json!([1, 2, 2])));
    }

    #[test]
    fn nested_reordering_is_equal() {
        let a = json!({"spec": {"tags": ["a", "b"], "size": 1}});
        let b = json!({"spec": {"size": 1, "tags": ["b", "a"]}});
        assert!(canonical_eq(&a, &b));
    }

    #[test]
    fn value_changes_are_detected() {
        let a = json!({"size": 1});
        let b = json!({"size": 2});
        assert!(!canonical_eq(&a, &b));
    }
}
