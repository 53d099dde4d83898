//! Mutable state of a single migration run
//!
//! One `RunState` is threaded through every syncer. It carries the run
//! options and filters, the id translation tables built up as components are
//! reconciled, the recursion guard, and the three outputs an operator reads
//! afterwards: the diff log, the homework list and the output log.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::api::Kind;

/// Switches that shape a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Compute and record changes without issuing any mutating call
    pub dry_run: bool,
    /// Transfer package wheels from the source instead of installing from the index
    pub offline: bool,
    pub update_reports: bool,
    pub update_dashboards: bool,
    pub update_default_reports: bool,
}

impl RunOptions {
    /// Whether an existing, differing record of this kind may be overwritten
    pub fn updates_enabled(&self, kind: Kind) -> bool {
        match kind {
            Kind::Report => self.update_reports,
            Kind::Dashboard => self.update_dashboards,
            _ => true,
        }
    }
}

/// Per-kind include and exclude name lists.
///
/// An include list for a kind restricts that kind to the listed names; an
/// exclude list removes names. Kinds without a list are unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    include: HashMap<Kind, HashSet<String>>,
    exclude: HashMap<Kind, HashSet<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include<I, S>(mut self, kind: Kind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include
            .entry(kind)
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, kind: Kind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude
            .entry(kind)
            .or_default()
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn has_include(&self) -> bool {
        self.include.values().any(|names| !names.is_empty())
    }

    pub fn has_exclude(&self) -> bool {
        self.exclude.values().any(|names| !names.is_empty())
    }

    pub fn is_excluded(&self, kind: Kind, name: &str) -> bool {
        if let Some(names) = self.include.get(&kind).filter(|n| !n.is_empty()) {
            return !names.contains(name);
        }
        self.exclude
            .get(&kind)
            .is_some_and(|names| names.contains(name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
    Added,
    Updated,
}

impl DiffAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiffAction::Added => "added",
            DiffAction::Updated => "updated",
        }
    }
}

/// What was (or, in a dry run, would be) added or updated, by kind then name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiffLog(BTreeMap<Kind, BTreeMap<String, DiffAction>>);

impl DiffLog {
    /// Record a change. An item added earlier in the run stays `Added`.
    pub fn record(&mut self, kind: Kind, name: impl Into<String>, action: DiffAction) {
        let entry = self.0.entry(kind).or_default().entry(name.into()).or_insert(action);
        if *entry != DiffAction::Added {
            *entry = action;
        }
    }

    #[cfg(test)]
    pub fn get(&self, kind: Kind, name: &str) -> Option<DiffAction> {
        self.0.get(&kind).and_then(|items| items.get(name)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Kind, &str, DiffAction)> {
        self.0.iter().flat_map(|(kind, items)| {
            items
                .iter()
                .map(move |(name, action)| (*kind, name.as_str(), *action))
        })
    }
}

/// Manual follow-up actions the operator must perform, by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Homework(BTreeMap<Kind, Vec<String>>);

impl Homework {
    pub fn add(&mut self, kind: Kind, note: impl Into<String>) {
        let note = note.into();
        let notes = self.0.entry(kind).or_default();
        if !notes.contains(&note) {
            notes.push(note);
        }
    }

    pub fn for_kind(&self, kind: Kind) -> &[String] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    /// Notes grouped by kind, in sync order, skipping kinds without notes
    pub fn iter(&self) -> impl Iterator<Item = (Kind, &[String])> {
        Kind::ALL
            .into_iter()
            .map(|kind| (kind, self.for_kind(kind)))
            .filter(|(_, notes)| !notes.is_empty())
    }
}

#[derive(Debug, Default)]
pub struct RunState {
    pub options: RunOptions,
    filters: Filters,
    diff_log: DiffLog,
    homework: Homework,
    output_log: Vec<String>,
    tracking_ids: HashMap<String, String>,
    entity_ids: HashMap<(Kind, String), String>,
    resolving: HashSet<(Kind, String)>,
    completed: HashSet<(Kind, String)>,
}

impl RunState {
    pub fn new(options: RunOptions, filters: Filters) -> Self {
        Self {
            options,
            filters,
            ..Self::default()
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.options.dry_run
    }

    pub fn is_excluded(&self, kind: Kind, name: &str) -> bool {
        self.filters.is_excluded(kind, name)
    }

    /// Skip-check that also logs the skip
    pub fn skip_if_excluded(&mut self, kind: Kind, name: &str) -> bool {
        let excluded = self.is_excluded(kind, name);
        if excluded {
            self.output(format!(
                "Skipping {} '{}' since it is excluded by the run filters.",
                kind, name
            ));
        }
        excluded
    }

    pub fn record_diff(&mut self, kind: Kind, name: impl Into<String>, action: DiffAction) {
        self.diff_log.record(kind, name, action);
    }

    pub fn add_homework(&mut self, kind: Kind, note: impl Into<String>) {
        let note = note.into();
        log::warn!("Homework: {}", note);
        self.homework.add(kind, note);
    }

    /// Append a line to the output log and emit it through the logger
    pub fn output(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::info!("{}", line);
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        self.output_log.push(format!("{} {}", stamp, line));
    }

    /// Record the destination counterpart of a source application's tracking field
    pub fn map_tracking_id(&mut self, source: impl Into<String>, destination: impl Into<String>) {
        self.tracking_ids.insert(source.into(), destination.into());
    }

    pub fn tracking_ids(&self) -> &HashMap<String, String> {
        &self.tracking_ids
    }

    /// Record the destination id of a source record
    pub fn map_entity_id(
        &mut self,
        kind: Kind,
        source_id: impl Into<String>,
        destination_id: impl Into<String>,
    ) {
        self.entity_ids
            .insert((kind, source_id.into()), destination_id.into());
    }

    pub fn resolved_id(&self, kind: Kind, source_id: &str) -> Option<String> {
        self.entity_ids
            .get(&(kind, source_id.to_string()))
            .cloned()
    }

    /// Enter an item for processing.
    ///
    /// Returns `false` when the item is already being resolved further up the
    /// call stack or has already been completed this run; the caller must then
    /// return without touching it.
    pub fn begin(&mut self, kind: Kind, key: &str) -> bool {
        let entry = (kind, key.to_string());
        if self.completed.contains(&entry) {
            log::debug!("{} '{}' was already synced in this run", kind, key);
            return false;
        }
        if !self.resolving.insert(entry) {
            log::debug!("{} '{}' is already being resolved; not recursing", kind, key);
            return false;
        }
        true
    }

    /// Leave an item. Only successful items are remembered as completed.
    pub fn finish(&mut self, kind: Kind, key: &str, succeeded: bool) {
        let entry = (kind, key.to_string());
        self.resolving.remove(&entry);
        if succeeded {
            self.completed.insert(entry);
        }
    }

    pub fn diff_log(&self) -> &DiffLog {
        &self.diff_log
    }

    pub fn homework(&self) -> &Homework {
        &self.homework
    }

    pub fn output_log(&self) -> &[String] {
        &self.output_log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_list_restricts_only_its_kind() {
        let filters = Filters::new().include(Kind::Task, ["Enrich"]);
        assert!(!filters.is_excluded(Kind::Task, "Enrich"));
        assert!(filters.is_excluded(Kind::Task, "Notify"));
        assert!(!filters.is_excluded(Kind::Report, "Anything"));
        assert!(filters.has_include());
        assert!(!filters.has_exclude());
    }

    #[test]
    fn test_exclude_list_removes_names() {
        let filters = Filters::new().exclude(Kind::User, ["svc-account"]);
        assert!(filters.is_excluded(Kind::User, "svc-account"));
        assert!(!filters.is_excluded(Kind::User, "analyst"));
    }

    #[test]
    fn test_diff_log_keeps_added_over_updated() {
        let mut log = DiffLog::default();
        log.record(Kind::Report, "Open", DiffAction::Added);
        log.record(Kind::Report, "Open", DiffAction::Updated);
        log.record(Kind::Report, "Closed", DiffAction::Updated);
        assert_eq!(log.get(Kind::Report, "Open"), Some(DiffAction::Added));
        assert_eq!(log.get(Kind::Report, "Closed"), Some(DiffAction::Updated));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_homework_deduplicates_notes() {
        let mut state = RunState::default();
        state.add_homework(Kind::Asset, "re-enter secret");
        state.add_homework(Kind::Asset, "re-enter secret");
        assert_eq!(state.homework().for_kind(Kind::Asset).len(), 1);
    }

    #[test]
    fn test_begin_guards_recursion_and_completed_items() {
        let mut state = RunState::default();
        assert!(state.begin(Kind::Role, "Analyst"));
        assert!(!state.begin(Kind::Role, "Analyst"));

        state.finish(Kind::Role, "Analyst", true);
        assert!(!state.begin(Kind::Role, "Analyst"));

        assert!(state.begin(Kind::Group, "Tier 1"));
        state.finish(Kind::Group, "Tier 1", false);
        assert!(state.begin(Kind::Group, "Tier 1"));
    }

    #[test]
    fn test_output_is_timestamped_and_kept() {
        let mut state = RunState::default();
        state.output("Adding asset 'smtp'");
        assert_eq!(state.output_log().len(), 1);
        assert!(state.output_log()[0].ends_with("Adding asset 'smtp'"));
    }

    #[test]
    fn test_updates_enabled_per_kind() {
        let options = RunOptions {
            update_reports: true,
            ..RunOptions::default()
        };
        assert!(options.updates_enabled(Kind::Report));
        assert!(!options.updates_enabled(Kind::Dashboard));
        assert!(options.updates_enabled(Kind::Task));
    }
}
