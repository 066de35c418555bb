//! Request and result types exchanged with the modification engine, plus the
//! relevance verdicts and node edits passed between its stages.

use crate::parser::StructuralNode;
use crate::scope::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The path that actually produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Approach {
    NodeEdit,
    FullFile,
    ComponentAddition,
    /// Component creation used after the classified strategy failed
    ComponentFallback,
    /// Hardcoded stub written with no external call
    EmergencyFallback,
}

impl Approach {
    pub fn as_str(&self) -> &'static str {
        match self {
            Approach::NodeEdit => "NODE_EDIT",
            Approach::FullFile => "FULL_FILE",
            Approach::ComponentAddition => "COMPONENT_ADDITION",
            Approach::ComponentFallback => "COMPONENT_FALLBACK",
            Approach::EmergencyFallback => "EMERGENCY_FALLBACK",
        }
    }
}

impl From<Strategy> for Approach {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::NodeEdit => Approach::NodeEdit,
            Strategy::FullFile => Approach::FullFile,
            Strategy::ComponentAddition => Approach::ComponentAddition,
        }
    }
}

impl fmt::Display for Approach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRequest {
    pub project_root: PathBuf,
    pub session_id: String,
    pub prompt: String,
}

impl ModificationRequest {
    pub fn new(project_root: impl Into<PathBuf>, session_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into(),
            session_id: session_id.into(),
            prompt: prompt.into(),
        }
    }
}

/// Per-file relevance verdict for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevanceResult {
    pub file_path: String,
    pub is_relevant: bool,
    /// 0-100
    pub score: u8,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_nodes: Vec<StructuralNode>,
}

impl RelevanceResult {
    pub fn not_relevant(file_path: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            is_relevant: false,
            score: 0,
            reasoning: reasoning.into(),
            target_nodes: Vec::new(),
        }
    }

    pub fn is_admitted(&self, threshold: u8) -> bool {
        self.is_relevant && self.score >= threshold
    }
}

/// Caller-facing outcome of one modification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationResult {
    pub success: bool,
    pub selected_files: Vec<String>,
    pub added_files: Vec<String>,
    pub approach: Approach,
    pub reasoning: String,
    pub modification_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
