//! Baseline-relative JSON merge patches (RFC 7386).

use serde_json::{Map, Value};

/// Compute the merge patch that turns `original` into `modified`.
///
/// Keys missing from `modified` become `null` (deletion); arrays and scalars
/// are replaced whole. Equal documents yield an empty object.
pub fn merge_diff(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();

            for (key, new_value) in modified {
                match original.get(key) {
                    Some(old_value) if old_value == new_value => {}
                    Some(old_value @ Value::Object(_)) if new_value.is_object() => {
                        let nested = merge_diff(old_value, new_value);
                        if !is_empty(&nested) {
                            patch.insert(key.clone(), nested);
                        }
                    }
                    _ => {
                        patch.insert(key.clone(), new_value.clone());
                    }
                }
            }

            for key in original.keys() {
                if !modified.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }

            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Whether a patch would change nothing.
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// Keep only the `status` member of a patch.
pub fn status_only(patch: Value) -> Value {
    let mut filtered = Map::new();
    if let Value::Object(mut map) = patch {
        if let Some(status) = map.remove("status") {
            filtered.insert("status".to_string(), status);
        }
    }
    Value::Object(filtered)
}

/// Drop the `status` member of a patch.
pub fn without_status(patch: Value) -> Value {
    match patch {
        Value::Object(mut map) => {
            map.remove("status");
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_equal_documents_yield_empty_patch() {
        let doc = json!({"spec": {"url": "oci://a", "type": "oci"}});
        assert!(is_empty(&merge_diff(&doc, &doc)));
    }

    #[test]
    fn test_only_changed_leaves_are_emitted() {
        let original = json!({"metadata": {"name": "a"}, "spec": {"url": "oci://a", "type": "oci"}});
        let modified = json!({"metadata": {"name": "a"}, "spec": {"url": "oci://b", "type": "oci"}});
        assert_eq!(merge_diff(&original, &modified), json!({"spec": {"url": "oci://b"}}));
    }

    #[test]
    fn test_removed_keys_become_null() {
        let original = json!({"metadata": {"finalizers": ["f"]}});
        let modified = json!({"metadata": {}});
        assert_eq!(
            merge_diff(&original, &modified),
            json!({"metadata": {"finalizers": null}})
        );
    }

    #[test]
    fn test_arrays_replace_whole() {
        let original = json!({"paths": ["/a", "/b"]});
        let modified = json!({"paths": ["/a"]});
        assert_eq!(merge_diff(&original, &modified), json!({"paths": ["/a"]}));
    }

    #[test]
    fn test_diff_applies_back_with_merge() {
        let original = json!({"spec": {"a": 1, "b": {"c": 2, "d": 3}}, "keep": true});
        let modified = json!({"spec": {"a": 2, "b": {"c": 2}}, "keep": true});
        let patch = merge_diff(&original, &modified);

        let mut applied = original.clone();
        json_patch::merge(&mut applied, &patch);
        assert_eq!(applied, modified);
    }

    #[test]
    fn test_status_split() {
        let patch = json!({"metadata": {"finalizers": ["f"]}, "status": {"x": 1}});
        assert_eq!(status_only(patch.clone()), json!({"status": {"x": 1}}));
        assert_eq!(without_status(patch), json!({"metadata": {"finalizers": ["f"]}}));
    }
}
