//! End-of-run report: the diff log, the homework list and the output log

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use colored::*;
use serde::Serialize;

use super::state::{DiffAction, DiffLog, Homework, RunState};

pub const DIFF_LOG_FILE: &str = "diff_log.json";
pub const HOMEWORK_FILE: &str = "homework.txt";
pub const OUTPUT_LOG_FILE: &str = "output.log";

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub source: String,
    pub destination: String,
    pub dry_run: bool,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub diff_log: DiffLog,
    pub homework: Homework,
    #[serde(skip)]
    pub output_log: Vec<String>,
}

impl RunReport {
    pub fn new(
        source: &str,
        destination: &str,
        state: &RunState,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            dry_run: state.is_dry_run(),
            started_at,
            finished_at: Local::now(),
            diff_log: state.diff_log().clone(),
            homework: state.homework().clone(),
            output_log: state.output_log().to_vec(),
        }
    }

    /// Write the three report files into `dir`, creating it if needed
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;

        let diff_path = dir.join(DIFF_LOG_FILE);
        let json = serde_json::to_string_pretty(self).context("Failed to serialize diff log")?;
        fs::write(&diff_path, json)
            .with_context(|| format!("Failed to write {}", diff_path.display()))?;

        let homework_path = dir.join(HOMEWORK_FILE);
        fs::write(&homework_path, homework_text(&self.homework))
            .with_context(|| format!("Failed to write {}", homework_path.display()))?;

        let output_path = dir.join(OUTPUT_LOG_FILE);
        let mut output = self.output_log.join("\n");
        output.push('\n');
        fs::write(&output_path, output)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;

        Ok(vec![diff_path, homework_path, output_path])
    }
}

/// Plain-text homework, one titled section per kind
fn homework_text(homework: &Homework) -> String {
    if homework.is_empty() {
        return "No manual follow-up needed.\n".to_string();
    }
    let mut text = String::new();
    for (kind, notes) in homework.iter() {
        if notes.is_empty() {
            continue;
        }
        let title = kind.collection().to_uppercase();
        text.push_str(&format!("{}\n{}\n", title, "=".repeat(title.len())));
        for note in notes {
            text.push_str(&format!("- {}\n", note));
        }
        text.push('\n');
    }
    text
}

/// Console rendering of the diff log
pub fn format_diff_log(diff_log: &DiffLog) -> String {
    if diff_log.is_empty() {
        return format!("{}", "Destination is already up to date.".green());
    }
    let mut lines = Vec::new();
    let mut current = None;
    for (kind, name, action) in diff_log.iter() {
        if current != Some(kind) {
            lines.push(format!("{}", kind.collection().bold()));
            current = Some(kind);
        }
        let marker = match action {
            DiffAction::Added => "+".green(),
            DiffAction::Updated => "~".yellow(),
        };
        lines.push(format!("  {} {} ({})", marker, name, action.as_str().dimmed()));
    }
    lines.join("\n")
}

/// Console rendering of the homework list
pub fn format_homework(homework: &Homework) -> String {
    let mut lines = vec![format!("{}", "Manual follow-up".bold().yellow())];
    for (kind, notes) in homework.iter() {
        for note in notes {
            lines.push(format!("  [{}] {}", kind.collection().cyan(), note));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Kind;
    use crate::sync::state::{Filters, RunOptions};

    fn state() -> RunState {
        let mut state = RunState::new(RunOptions::default(), Filters::new());
        state.record_diff(Kind::Task, "Enrich", DiffAction::Added);
        state.record_diff(Kind::Report, "Open", DiffAction::Updated);
        state.add_homework(Kind::Asset, "Re-enter the secrets of asset 'vt'.");
        state.output("Processing task 'Enrich'.");
        state
    }

    #[test]
    fn test_report_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let report = RunReport::new("https://a", "https://b", &state(), Local::now());
        let written = report.write_to(&dir.path().join("run")).unwrap();
        assert_eq!(written.len(), 3);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert_eq!(json["diff_log"]["task"]["Enrich"], "added");
        assert_eq!(json["diff_log"]["report"]["Open"], "updated");

        let homework = fs::read_to_string(&written[1]).unwrap();
        assert!(homework.starts_with("ASSETS\n======\n"));
        assert!(homework.contains("- Re-enter the secrets of asset 'vt'."));

        let output = fs::read_to_string(&written[2]).unwrap();
        assert!(output.contains("Processing task 'Enrich'."));
    }

    #[test]
    fn test_formatting_lists_every_entry() {
        colored::control::set_override(false);
        let state = state();
        let diff = format_diff_log(state.diff_log());
        assert!(diff.contains("+ Enrich (added)"));
        assert!(diff.contains("~ Open (updated)"));
        assert!(format_homework(state.homework()).contains("[assets] Re-enter"));
    }

    #[test]
    fn test_empty_homework_says_so() {
        assert_eq!(homework_text(&Homework::default()), "No manual follow-up needed.\n");
    }
}
