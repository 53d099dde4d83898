//! Typed read-only views over generic records
//!
//! Syncers build these from an `Entity` for the few fields they branch on. A
//! view fails with the path of the first required field that is missing.

use super::models::Entity;

/// Action types executed by the platform itself rather than by an installed plugin
pub const BUILTIN_TASK_ACTION_TYPES: [&str; 7] = [
    "python",
    "python3",
    "powershell",
    "api",
    "email",
    "networkFile",
    "python36",
];

/// Report name every application owns exactly once
pub const DEFAULT_REPORT_NAME: &str = "Default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction<'a> {
    Builtin(&'a str),
    Plugin {
        plugin_name: &'a str,
        action_type: &'a str,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct TaskView<'a> {
    pub name: &'a str,
    pub uid: Option<&'a str>,
    pub action: TaskAction<'a>,
    pub asset_id: Option<&'a str>,
    pub application_id: Option<&'a str>,
}

impl<'a> TaskView<'a> {
    pub fn parse(task: &'a Entity) -> Result<Self, &'static str> {
        let name = task.str("name").ok_or("/name")?;
        let action_type = task
            .pointer_str("/action/descriptor/actionType")
            .or_else(|| task.pointer_str("/action/type"))
            .ok_or("/action/descriptor/actionType")?;

        let action = if BUILTIN_TASK_ACTION_TYPES.contains(&action_type) {
            TaskAction::Builtin(action_type)
        } else {
            let plugin_name = task
                .pointer_str("/action/descriptor/packageDescriptor/name")
                .ok_or("/action/descriptor/packageDescriptor/name")?;
            TaskAction::Plugin {
                plugin_name,
                action_type,
            }
        };

        Ok(Self {
            name,
            uid: task.str("uid"),
            action,
            asset_id: task.pointer_str("/action/assetId"),
            application_id: task.str("applicationId"),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReportView<'a> {
    pub name: &'a str,
    pub application_id: &'a str,
}

impl<'a> ReportView<'a> {
    pub fn parse(report: &'a Entity) -> Result<Self, &'static str> {
        Ok(Self {
            name: report.str("name").ok_or("/name")?,
            application_id: report
                .pointer_str("/applicationIds/0")
                .ok_or("/applicationIds/0")?,
        })
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_REPORT_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_task_is_classified_without_plugin_fields() {
        let task = Entity::from_value(json!({
            "name": "Parse Email",
            "action": {"type": "python3"}
        }))
        .unwrap();
        let view = TaskView::parse(&task).unwrap();
        assert_eq!(view.action, TaskAction::Builtin("python3"));
    }

    #[test]
    fn test_plugin_task_requires_package_descriptor_name() {
        let task = Entity::from_value(json!({
            "name": "VT Lookup",
            "action": {"descriptor": {"actionType": "GetAnalyses"}}
        }))
        .unwrap();
        assert_eq!(
            TaskView::parse(&task).unwrap_err(),
            "/action/descriptor/packageDescriptor/name"
        );
    }

    #[test]
    fn test_report_view_detects_default() {
        let report = Entity::from_value(json!({
            "name": "Default",
            "applicationIds": ["app-1"]
        }))
        .unwrap();
        let view = ReportView::parse(&report).unwrap();
        assert!(view.is_default());
        assert_eq!(view.application_id, "app-1");
    }
}
