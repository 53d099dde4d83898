//! Destination plugin inventory
//!
//! Installing a plugin bundle gives it a fresh `fileId` and fresh ids for each
//! of its actions. Tasks copied from the source still point at the source's
//! ids; this inventory is what they are rewritten against.

use std::collections::HashMap;

use crate::api::{ApiResult, Entity, Instance, Kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionIds {
    pub id: String,
    pub image_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginIds {
    pub file_id: Option<String>,
    pub actions: HashMap<String, ActionIds>,
}

/// Destination ids resolved for one plugin action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAction<'a> {
    pub file_id: &'a str,
    pub action_id: &'a str,
    pub image_id: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct PluginInventory {
    plugins: HashMap<String, PluginIds>,
}

impl PluginInventory {
    /// Read every installed plugin (in full) from the destination
    pub async fn build(destination: &dyn Instance) -> ApiResult<Self> {
        let mut full = Vec::new();
        for plugin in destination.list(Kind::Plugin).await? {
            let id = plugin.id().map(str::to_string);
            let record = match id {
                Some(id) => destination
                    .get(Kind::Plugin, &id)
                    .await?
                    .unwrap_or(plugin),
                None => plugin,
            };
            full.push(record);
        }
        let inventory = Self::from_plugins(full);
        log::debug!(
            "Built destination plugin inventory with {} plugins",
            inventory.plugins.len()
        );
        Ok(inventory)
    }

    pub fn from_plugins(plugins: impl IntoIterator<Item = Entity>) -> Self {
        let mut inventory = Self::default();
        for plugin in plugins {
            let Some(name) = plugin.str("name") else {
                continue;
            };
            let entry = inventory.plugins.entry(name.to_string()).or_default();
            if let Some(file_id) = plugin.str("fileId") {
                entry.file_id = Some(file_id.to_string());
            }
            let descriptors = plugin
                .get("availableActionDescriptors")
                .and_then(|v| v.as_array())
                .into_iter()
                .flatten();
            for descriptor in descriptors {
                let field = |key: &str| descriptor.get(key).and_then(|v| v.as_str());
                if let (Some(action_type), Some(id), Some(image_id)) =
                    (field("actionType"), field("id"), field("imageId"))
                {
                    entry.actions.entry(action_type.to_string()).or_insert(ActionIds {
                        id: id.to_string(),
                        image_id: image_id.to_string(),
                    });
                }
            }
        }
        inventory
    }

    pub fn contains_plugin(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Destination ids for a plugin action, or the reason they are unknown
    pub fn lookup(&self, plugin: &str, action_type: &str) -> Result<ResolvedAction<'_>, String> {
        let ids = self
            .plugins
            .get(plugin)
            .ok_or_else(|| format!("plugin '{}' is not installed on the destination", plugin))?;
        let action = ids.actions.get(action_type).ok_or_else(|| {
            format!(
                "plugin '{}' on the destination has no action '{}'",
                plugin, action_type
            )
        })?;
        let file_id = ids
            .file_id
            .as_deref()
            .ok_or_else(|| format!("plugin '{}' on the destination has no fileId", plugin))?;
        Ok(ResolvedAction {
            file_id,
            action_id: &action.id,
            image_id: &action.image_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plugin() -> Entity {
        Entity::from_value(json!({
            "id": "p1",
            "name": "sw_virus_total",
            "fileId": "F1",
            "availableActionDescriptors": [
                {"actionType": "GetAnalyses", "id": "X1", "imageId": "I1"},
                {"actionType": "ScanUrl", "id": "X2", "imageId": "I2"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_lookup_returns_destination_ids() {
        let inventory = PluginInventory::from_plugins([plugin()]);
        let resolved = inventory.lookup("sw_virus_total", "GetAnalyses").unwrap();
        assert_eq!(resolved.file_id, "F1");
        assert_eq!(resolved.action_id, "X1");
        assert_eq!(resolved.image_id, "I1");
    }

    #[test]
    fn test_lookup_explains_what_is_missing() {
        let inventory = PluginInventory::from_plugins([plugin()]);
        assert!(inventory.lookup("sw_other", "GetAnalyses").unwrap_err().contains("not installed"));
        assert!(inventory.lookup("sw_virus_total", "Delete").unwrap_err().contains("no action 'Delete'"));
    }

    #[test]
    fn test_plugin_without_file_id_cannot_resolve() {
        let mut record = plugin();
        record.remove("fileId");
        let inventory = PluginInventory::from_plugins([record]);
        assert!(inventory.contains_plugin("sw_virus_total"));
        assert!(inventory.lookup("sw_virus_total", "GetAnalyses").unwrap_err().contains("fileId"));
    }
}
