//! Rewriting of cross-references from source ids to destination ids
//!
//! Each function here is pure: it takes the record plus whatever translation
//! data it needs and edits the record in place, reporting how many references
//! it rewrote (or which it could not).

use std::collections::HashMap;

use serde_json::Value;

use super::error::{SyncError, SyncResult};
use super::inventory::PluginInventory;
use crate::api::{Entity, Kind};

const FILE_ID_PATH: &str = "/action/descriptor/packageDescriptor/fileId";
const IMAGE_ID_PATH: &str = "/action/descriptor/imageId";
const PACKAGE_DESCRIPTOR_ID_PATH: &str = "/action/packageDescriptorId";

/// Point a plugin-backed task at the destination's copy of its plugin.
///
/// Rewrites the package `fileId`, the action `imageId` and the
/// `packageDescriptorId`. A plugin or action missing from the inventory is a
/// lookup failure for this task; a task lacking the fields is an access error.
pub fn remap_plugin_ids(
    task: &mut Entity,
    plugin_name: &str,
    action_type: &str,
    inventory: &PluginInventory,
) -> SyncResult<()> {
    let name = task.label();
    let resolved = inventory
        .lookup(plugin_name, action_type)
        .map_err(|reason| SyncError::lookup(Kind::Task, name.clone(), reason))?;

    for (path, value) in [
        (FILE_ID_PATH, resolved.file_id),
        (IMAGE_ID_PATH, resolved.image_id),
        (PACKAGE_DESCRIPTOR_ID_PATH, resolved.action_id),
    ] {
        if !task.set_pointer(path, Value::String(value.to_string())) {
            return Err(SyncError::access(Kind::Task, name, path));
        }
        log::debug!("Set {} on task '{}' to '{}'", path, name, value);
    }
    Ok(())
}

/// Replace a string with its mapped counterpart, if it has one
fn translate(value: &mut Value, table: &HashMap<String, String>) -> bool {
    let mapped = value.as_str().and_then(|s| table.get(s));
    match mapped {
        Some(mapped) => {
            *value = Value::String(mapped.clone());
            true
        }
        None => false,
    }
}

fn remap_mapping_values(mappings: Option<&mut Value>, table: &HashMap<String, String>) -> usize {
    let Some(Value::Array(mappings)) = mappings else {
        return 0;
    };
    mappings
        .iter_mut()
        .filter_map(|mapping| mapping.get_mut("value"))
        .map(|value| translate(value, table) as usize)
        .sum()
}

/// Rewrite tracking-field references in a task's input and output mappings.
///
/// Touches `inputMapping[].value`, `outputs[].backReferenceFieldId` and
/// `outputs[].mappings[].value`; values without a mapping are left alone.
pub fn remap_tracking_ids(task: &mut Entity, tracking_ids: &HashMap<String, String>) -> usize {
    if tracking_ids.is_empty() {
        return 0;
    }
    let mut rewritten = remap_mapping_values(task.get_mut("inputMapping"), tracking_ids);
    if let Some(Value::Array(outputs)) = task.get_mut("outputs") {
        for output in outputs.iter_mut() {
            if let Some(back_reference) = output.get_mut("backReferenceFieldId") {
                if translate(back_reference, tracking_ids) {
                    rewritten += 1;
                }
            }
            rewritten += remap_mapping_values(output.get_mut("mappings"), tracking_ids);
        }
    }
    rewritten
}

/// Rewrite report columns that name a tracking field
pub fn remap_report_columns(report: &mut Entity, tracking_ids: &HashMap<String, String>) -> usize {
    match report.get_mut("columns") {
        Some(Value::Array(columns)) => columns
            .iter_mut()
            .map(|column| translate(column, tracking_ids) as usize)
            .sum(),
        _ => 0,
    }
}

/// Rewrite tracking references held in the `columns` of an application's fields
pub fn remap_field_columns(app: &mut Entity, tracking_ids: &HashMap<String, String>) -> usize {
    let Some(Value::Array(fields)) = app.get_mut("fields") else {
        return 0;
    };
    let mut rewritten = 0;
    for field in fields.iter_mut() {
        if let Some(Value::Array(columns)) = field.get_mut("columns") {
            rewritten += columns
                .iter_mut()
                .map(|column| translate(column, tracking_ids) as usize)
                .sum::<usize>();
        }
    }
    rewritten
}

/// Re-parent workflow stages from the source workflow to the destination one.
///
/// Only stages whose `parentId` is exactly the source workflow id change;
/// nested stages keep pointing at their (copied) parent stage.
pub fn remap_stage_parents(
    stages: &mut Value,
    source_workflow_id: &str,
    destination_workflow_id: &str,
) -> usize {
    let Value::Array(stages) = stages else {
        return 0;
    };
    let mut rewritten = 0;
    for stage in stages.iter_mut() {
        if let Some(parent) = stage.get_mut("parentId") {
            if parent.as_str() == Some(source_workflow_id) {
                *parent = Value::String(destination_workflow_id.to_string());
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Rewrite each element of a string-id array (`applicationIds`) through `resolve`.
///
/// Ids `resolve` does not know are kept.
pub fn remap_id_list(
    entity: &mut Entity,
    key: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> usize {
    let Some(Value::Array(ids)) = entity.get_mut(key) else {
        return 0;
    };
    let mut rewritten = 0;
    for id in ids.iter_mut() {
        if let Some(mapped) = id.as_str().and_then(&resolve) {
            *id = Value::String(mapped);
            rewritten += 1;
        }
    }
    rewritten
}

/// Rewrite a plain id list through `resolve`, removing ids it cannot translate.
///
/// Returns the removed ids.
pub fn retain_id_list(
    entity: &mut Entity,
    key: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let Some(Value::Array(ids)) = entity.get_mut(key) else {
        return Vec::new();
    };
    let mut dropped = Vec::new();
    ids.retain_mut(|id| {
        let Some(raw) = id.as_str().map(str::to_string) else {
            return true;
        };
        match resolve(&raw) {
            Some(mapped) => {
                *id = Value::String(mapped);
                true
            }
            None => {
                dropped.push(raw);
                false
            }
        }
    });
    dropped
}

/// Ids held in a plain id list
pub fn id_list(entity: &Entity, key: &str) -> Vec<String> {
    entity
        .get(key)
        .and_then(|v| v.as_array())
        .map(|ids| {
            ids.iter()
                .filter_map(|v| v.as_str())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Rewrite each dashboard card's `reportId` through `resolve`
pub fn remap_dashboard_reports(
    dashboard: &mut Entity,
    resolve: impl Fn(&str) -> Option<String>,
) -> usize {
    let Some(Value::Array(cards)) = dashboard.get_mut("items") else {
        return 0;
    };
    let mut rewritten = 0;
    for card in cards.iter_mut() {
        if let Some(report_id) = card.get_mut("reportId") {
            if let Some(mapped) = report_id.as_str().and_then(&resolve) {
                *report_id = Value::String(mapped);
                rewritten += 1;
            }
        }
    }
    rewritten
}

/// Remove dashboard cards whose report is in `dangling`, returning how many went
pub fn drop_dashboard_cards(dashboard: &mut Entity, dangling: &[String]) -> usize {
    let Some(Value::Array(cards)) = dashboard.get_mut("items") else {
        return 0;
    };
    let before = cards.len();
    cards.retain(|card| {
        card.get("reportId")
            .and_then(|v| v.as_str())
            .is_none_or(|id| !dangling.iter().any(|d| d == id))
    });
    before - cards.len()
}

/// Rewrite membership references (`[{id, name}]`) through `resolve`.
///
/// References `resolve` cannot translate are removed; their names are
/// returned so the caller can report them.
pub fn remap_membership(
    entity: &mut Entity,
    key: &str,
    resolve: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let Some(Value::Array(members)) = entity.get_mut(key) else {
        return Vec::new();
    };
    let mut dropped = Vec::new();
    members.retain_mut(|member| {
        let id = member.get("id").and_then(|v| v.as_str()).map(str::to_string);
        match id.as_deref().and_then(&resolve) {
            Some(mapped) => {
                if let Some(slot) = member.get_mut("id") {
                    *slot = Value::String(mapped);
                }
                true
            }
            None => {
                let label = member
                    .get("name")
                    .and_then(|v| v.as_str())
                    .or(id.as_deref())
                    .unwrap_or("<unnamed>");
                dropped.push(label.to_string());
                false
            }
        }
    });
    dropped
}

/// Ids referenced by a membership list, with the member's name for messages
pub fn membership_ids(entity: &Entity, key: &str) -> Vec<(String, String)> {
    entity
        .get(key)
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|member| {
            let id = member.get("id")?.as_str()?.to_string();
            let name = member
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or(&id)
                .to_string();
            Some((id, name))
        })
        .collect()
}
