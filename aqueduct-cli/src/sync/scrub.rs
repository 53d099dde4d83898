//! Removal of environment-generated, non-semantic fields
//!
//! Both systems stamp records with audit data, permission blocks and internal
//! type tags that never match across instances. Scrubbing strips them
//! recursively so only meaningful content is compared and sent.

use serde_json::{Map, Value};

use crate::api::Entity;

/// Internal type discriminator the platform serializes on polymorphic records
pub const TYPE_DISCRIMINATOR: &str = "$type";

pub const AUDIT_TIMESTAMP_KEYS: [&str; 4] = ["createdDate", "modifiedDate", "createdOn", "modifiedOn"];

pub const AUDIT_USER_KEYS: [&str; 4] = ["createdByUser", "modifiedByUser", "createdBy", "modifiedBy"];

pub const PERMISSION_KEYS: [&str; 1] = ["permissions"];

pub fn is_audit_key(key: &str) -> bool {
    AUDIT_TIMESTAMP_KEYS.contains(&key) || AUDIT_USER_KEYS.contains(&key)
}

fn is_volatile(key: &str, keep: &[&str]) -> bool {
    if keep.contains(&key) {
        return false;
    }
    key == TYPE_DISCRIMINATOR || is_audit_key(key) || PERMISSION_KEYS.contains(&key)
}

/// Strip volatile keys from a value in place, at any depth
pub fn scrub(value: &mut Value) {
    scrub_keeping(value, &[]);
}

/// Like `scrub`, but leaves the named keys alone (roles carry their meaning in `permissions`)
pub fn scrub_keeping(value: &mut Value, keep: &[&str]) {
    match value {
        Value::Object(map) => scrub_map(map, keep),
        Value::Array(items) => items.iter_mut().for_each(|item| scrub_keeping(item, keep)),
        _ => {}
    }
}

fn scrub_map(map: &mut Map<String, Value>, keep: &[&str]) {
    map.retain(|key, _| !is_volatile(key, keep));
    for value in map.values_mut() {
        scrub_keeping(value, keep);
    }
}

/// A scrubbed copy of a value
pub fn scrubbed(value: &Value) -> Value {
    let mut copy = value.clone();
    scrub(&mut copy);
    copy
}

pub fn scrub_entity(entity: &mut Entity) {
    scrub_map(entity.as_map_mut(), &[]);
}

pub fn scrub_entity_keeping(entity: &mut Entity, keep: &[&str]) {
    scrub_map(entity.as_map_mut(), keep);
}
