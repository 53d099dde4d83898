//! Structural comparison of source and destination records
//!
//! The comparison is order-insensitive for arrays: the platform does not
//! guarantee stable ordering of fields, stages or cards between instances.

use serde_json::{Map, Value};

use super::scrub::{TYPE_DISCRIMINATOR, is_audit_key};
use crate::api::Entity;

/// Whether two records (or two same-kind arrays of records) differ materially.
///
/// The destination's own `id` is copied onto the source first, and audit
/// fields are dropped from both sides, so neither can produce a false positive.
pub fn is_different(source: &Value, destination: &Value) -> bool {
    let mut source = source.clone();
    let mut destination = destination.clone();

    if let (Some(src), Some(dest)) = (source.as_object_mut(), destination.as_object()) {
        if let (true, Some(dest_id)) = (src.contains_key("id"), dest.get("id")) {
            src.insert("id".to_string(), dest_id.clone());
        }
    }

    drop_audit_fields(&mut source);
    drop_audit_fields(&mut destination);

    !deep_equal(&source, &destination)
}

pub fn entity_is_different(source: &Entity, destination: &Entity) -> bool {
    is_different(&source.to_value(), &destination.to_value())
}

fn drop_audit_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| key != TYPE_DISCRIMINATOR && !is_audit_key(key));
            map.values_mut().for_each(drop_audit_fields);
        }
        Value::Array(items) => items.iter_mut().for_each(drop_audit_fields),
        _ => {}
    }
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => maps_equal(a, b),
        (Value::Array(a), Value::Array(b)) => arrays_equal(a, b),
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        _ => a == b,
    }
}

fn maps_equal(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| deep_equal(value, other)))
}

/// Multiset equality: each element must pair with a distinct equal element
fn arrays_equal(a: &[Value], b: &[Value]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|item| {
        let found = b
            .iter()
            .enumerate()
            .position(|(i, other)| !used[i] && deep_equal(item, other));
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::scrub::scrubbed;
    use serde_json::json;

    #[test]
    fn test_differing_ids_alone_are_not_a_difference() {
        let source = json!({"id": "src-1", "name": "Asset", "parameters": {"host": "a"}});
        let destination = json!({"id": "dst-9", "name": "Asset", "parameters": {"host": "a"}});
        assert!(!is_different(&source, &destination));
    }

    #[test]
    fn test_audit_fields_are_ignored_on_either_side() {
        let source = json!({"name": "r", "modifiedDate": "2023"});
        let destination = json!({"name": "r", "createdByUser": {"id": "u"}, "modifiedDate": "2024"});
        assert!(!is_different(&source, &destination));
    }

    #[test]
    fn test_array_order_does_not_matter() {
        let source = json!([{"name": "a"}, {"name": "b"}, {"name": "a"}]);
        let destination = json!([{"name": "a"}, {"name": "a"}, {"name": "b"}]);
        assert!(!is_different(&source, &destination));

        let fewer = json!([{"name": "a"}, {"name": "b"}, {"name": "b"}]);
        assert!(is_different(&source, &fewer));
    }

    #[test]
    fn test_nested_value_change_is_detected() {
        let source = json!({"id": "1", "stages": [{"name": "s1", "conditions": [1, 2]}]});
        let destination = json!({"id": "2", "stages": [{"name": "s1", "conditions": [1, 3]}]});
        assert!(is_different(&source, &destination));
    }

    #[test]
    fn test_scrubbed_record_never_differs_from_itself() {
        let record = json!({
            "$type": "x",
            "id": "t1",
            "name": "Task",
            "createdDate": "d",
            "outputs": [{"mappings": [{"value": "f1"}]}],
            "permissions": {}
        });
        let clean = scrubbed(&record);
        assert!(!is_different(&clean, &clean));
    }

    #[test]
    fn test_integer_and_float_forms_compare_equal() {
        assert!(!is_different(&json!({"n": 1}), &json!({"n": 1.0})));
    }
}
