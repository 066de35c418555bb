//! Long-lived conversation records per project
//!
//! Only two operations are needed: fetch the latest active summary for a
//! project, and append one record. The JSONL store keeps them in
//! `<project>/.tailor/conversations.jsonl`, one record per line.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tailor_core::Approach;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const STORE_DIR: &str = ".tailor";
const CONVERSATIONS_FILE: &str = "conversations.jsonl";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: Uuid,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub approach: Approach,
    pub success: bool,
    #[serde(default)]
    pub files: Vec<String>,
    pub summary: String,
    /// Inactive records stay for audit but are not offered as context
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ConversationRecord {
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>, approach: Approach, success: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            prompt: prompt.into(),
            approach,
            success,
            files: Vec::new(),
            summary: String::new(),
            active: true,
        }
    }

    /// One-paragraph rendering used as classifier context.
    pub fn as_context(&self) -> String {
        let outcome = if self.success { "succeeded" } else { "failed" };
        let mut text = format!(
            "Previous request ({}): \"{}\" {} via {}.",
            self.timestamp.format("%Y-%m-%d %H:%M UTC"),
            self.prompt,
            outcome,
            self.approach
        );
        if !self.files.is_empty() {
            text.push_str(&format!(" Files: {}.", self.files.join(", ")));
        }
        if !self.summary.is_empty() {
            text.push('\n');
            text.push_str(&self.summary);
        }
        text
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn latest_active_summary(&self, project: &Path) -> anyhow::Result<Option<String>>;
    async fn append_record(&self, project: &Path, record: &ConversationRecord) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonlConversationStore;

impl JsonlConversationStore {
    pub fn path_for(project: &Path) -> PathBuf {
        project.join(STORE_DIR).join(CONVERSATIONS_FILE)
    }

    /// Up to `limit` latest records (newest last); unreadable lines are skipped.
    pub async fn load_recent(&self, project: &Path, limit: usize) -> anyhow::Result<Vec<ConversationRecord>> {
        let path = Self::path_for(project);
        if limit == 0 || !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut records: Vec<ConversationRecord> = content
            .lines()
            .filter_map(|line| serde_json::from_str::<ConversationRecord>(line).ok())
            .collect();
        if records.len() > limit {
            let split = records.len() - limit;
            records.drain(0..split);
        }
        Ok(records)
    }
}

#[async_trait]
impl ConversationStore for JsonlConversationStore {
    async fn latest_active_summary(&self, project: &Path) -> anyhow::Result<Option<String>> {
        let records = self.load_recent(project, usize::MAX).await?;
        Ok(records
            .iter()
            .rev()
            .find(|record| record.active)
            .map(ConversationRecord::as_context))
    }

    async fn append_record(&self, project: &Path, record: &ConversationRecord) -> anyhow::Result<()> {
        let path = Self::path_for(project);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let mut row = serde_json::to_string(record)?;
        row.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        file.write_all(row.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_project_has_no_summary() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore;
        assert_eq!(store.latest_active_summary(dir.path()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn latest_active_record_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore;

        let mut first = ConversationRecord::new("s1", "make the button red", Approach::NodeEdit, true);
        first.files = vec!["src/pages/Signup.tsx".into()];
        store.append_record(dir.path(), &first).await.unwrap();

        let mut retired = ConversationRecord::new("s1", "add an About page", Approach::ComponentAddition, true);
        retired.active = false;
        store.append_record(dir.path(), &retired).await.unwrap();

        let summary = store.latest_active_summary(dir.path()).await.unwrap().unwrap();
        assert!(summary.contains("make the button red"));
        assert!(summary.contains("src/pages/Signup.tsx"));
        assert!(!summary.contains("About"));
    }

    #[tokio::test]
    async fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlConversationStore;
        let record = ConversationRecord::new("s1", "first", Approach::FullFile, false);
        store.append_record(dir.path(), &record).await.unwrap();
        let path = JsonlConversationStore::path_for(dir.path());
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("{ truncated\n");
        std::fs::write(&path, content).unwrap();

        let records = store.load_recent(dir.path(), 10).await.unwrap();
        assert_eq!(records, vec![record]);
    }
}
