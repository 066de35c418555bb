//! Session change log
//!
//! Entries are appended in chronological order and never edited. Once the
//! log grows past its retention bound the oldest entries are folded into an
//! archive aggregate, so the totals keep counting them.

use crate::protocol::Approach;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Updated,
    Failed,
}

impl ChangeType {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Updated => "updated",
            ChangeType::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines_changed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// One applied (or rejected) file change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub file: String,
    pub description: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub approach: Approach,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ChangeDetails>,
}

impl ModificationChange {
    pub fn new(
        change_type: ChangeType,
        file: impl Into<String>,
        description: impl Into<String>,
        approach: Approach,
    ) -> Self {
        Self {
            success: change_type != ChangeType::Failed,
            change_type,
            file: file.into(),
            description: description.into(),
            timestamp: Utc::now(),
            approach,
            details: None,
        }
    }

    pub fn failed(file: impl Into<String>, description: impl Into<String>, approach: Approach) -> Self {
        Self::new(ChangeType::Failed, file, description, approach)
    }

    pub fn with_details(mut self, lines_changed: Option<usize>, reasoning: Option<String>) -> Self {
        self.details = Some(ChangeDetails {
            lines_changed,
            reasoning,
        });
        self
    }
}

/// Aggregate of entries folded out of the live log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedChanges {
    pub count: usize,
    pub created: usize,
    pub modified: usize,
    pub updated: usize,
    pub failed: usize,
    pub files: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
}

impl ArchivedChanges {
    fn absorb(&mut self, change: &ModificationChange) {
        self.count += 1;
        match change.change_type {
            ChangeType::Created => self.created += 1,
            ChangeType::Modified => self.modified += 1,
            ChangeType::Updated => self.updated += 1,
            ChangeType::Failed => self.failed += 1,
        }
        self.files.insert(change.file.clone());
        if self.first_timestamp.is_none() {
            self.first_timestamp = Some(change.timestamp);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLog {
    pub started_at: DateTime<Utc>,
    pub entries: Vec<ModificationChange>,
    #[serde(default)]
    pub archive: ArchivedChanges,
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl ChangeLog {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            entries: Vec::new(),
            archive: ArchivedChanges::default(),
        }
    }

    pub fn push(&mut self, change: ModificationChange) {
        self.entries.push(change);
    }

    /// Fold the oldest entries into the archive until at most `retention` remain.
    pub fn compact(&mut self, retention: usize) {
        if self.entries.len() <= retention {
            return;
        }
        let overflow = self.entries.len() - retention;
        for change in self.entries.drain(..overflow) {
            self.archive.absorb(&change);
        }
    }

    pub fn total_changes(&self) -> usize {
        self.archive.count + self.entries.len()
    }

    pub fn distinct_files(&self) -> usize {
        let mut files: BTreeSet<&str> = self.archive.files.iter().map(String::as_str).collect();
        files.extend(self.entries.iter().map(|c| c.file.as_str()));
        files.len()
    }

    fn count_of(&self, change_type: ChangeType) -> usize {
        let archived = match change_type {
            ChangeType::Created => self.archive.created,
            ChangeType::Modified => self.archive.modified,
            ChangeType::Updated => self.archive.updated,
            ChangeType::Failed => self.archive.failed,
        };
        archived
            + self
                .entries
                .iter()
                .filter(|c| c.change_type == change_type)
                .count()
    }

    pub fn recent(&self, n: usize) -> &[ModificationChange] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Bounded text summary: aggregate counts plus the `n` newest entries.
    pub fn recent_summary(&self, n: usize, now: DateTime<Utc>) -> String {
        if self.total_changes() == 0 {
            return "No changes in this session yet.".to_string();
        }

        let minutes = (now - self.started_at).num_minutes().max(0);
        let mut summary = format!(
            "Session duration: {} min. {} change(s) across {} file(s) ({} created, {} modified, {} updated, {} failed).",
            minutes,
            self.total_changes(),
            self.distinct_files(),
            self.count_of(ChangeType::Created),
            self.count_of(ChangeType::Modified),
            self.count_of(ChangeType::Updated),
            self.count_of(ChangeType::Failed),
        );

        summary.push_str("\nRecent changes:");
        for change in self.recent(n).iter().rev() {
            summary.push_str(&format!(
                "\n- {} {} ({}): {}",
                change.change_type.label(),
                change.file,
                change.approach.as_str(),
                truncate(&change.description, 160)
            ));
        }
        summary
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn change(n: usize, change_type: ChangeType) -> ModificationChange {
        ModificationChange::new(
            change_type,
            format!("src/File{}.tsx", n % 3),
            format!("change number {}", n),
            Approach::NodeEdit,
        )
    }

    #[test]
    fn change_serializes_type_field_and_success_follows_type() {
        let ok = change(1, ChangeType::Modified);
        assert!(ok.success);
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["type"], "modified");
        assert_eq!(value["approach"], "NODE_EDIT");
        assert!(!ModificationChange::failed("a.tsx", "rejected", Approach::FullFile).success);
    }

    #[test]
    fn summary_lists_only_the_newest_entries() {
        let started = Utc::now() - Duration::minutes(12);
        let mut log = ChangeLog::new(started);
        for n in 0..8 {
            log.push(change(n, ChangeType::Modified));
        }
        let summary = log.recent_summary(5, Utc::now());
        assert!(summary.contains("8 change(s) across 3 file(s)"));
        assert!(summary.contains("Session duration: 12 min"));
        assert!(summary.contains("change number 7"));
        assert!(summary.contains("change number 3"));
        assert!(!summary.contains("change number 2"));
        assert_eq!(summary.lines().filter(|l| l.starts_with("- ")).count(), 5);
    }

    #[test]
    fn compaction_folds_into_archive_without_losing_totals() {
        let mut log = ChangeLog::default();
        for n in 0..10 {
            let kind = if n % 2 == 0 { ChangeType::Modified } else { ChangeType::Failed };
            log.push(change(n, kind));
        }
        let first_timestamp = log.entries[0].timestamp;
        log.compact(4);

        assert_eq!(log.entries.len(), 4);
        assert_eq!(log.archive.count, 6);
        assert_eq!(log.archive.first_timestamp, Some(first_timestamp));
        assert_eq!(log.total_changes(), 10);
        assert_eq!(log.count_of(ChangeType::Failed), 5);
        assert_eq!(log.entries[0].description, "change number 6");
    }

    #[test]
    fn compaction_under_the_bound_is_a_no_op() {
        let mut log = ChangeLog::default();
        log.push(change(0, ChangeType::Created));
        log.compact(200);
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.archive, ArchivedChanges::default());
    }

    #[test]
    fn empty_log_has_a_fixed_summary() {
        let log = ChangeLog::default();
        assert_eq!(log.recent_summary(5, Utc::now()), "No changes in this session yet.");
    }
}
