//! Patch generation and application
//!
//! Both edit paths end in [`PatchApplier::commit`]: the edited text is checked
//! against a structural snapshot of the original, repaired if allowed, and
//! written atomically. Anything that fails leaves the file on disk and in the
//! file map exactly as it was.

use crate::error::PatchError;
use crate::llm::parse::sanitize_excerpt;
use crate::llm::{extract_code, normalize_generated_content, parse_structured_content, prompts, ReasoningService};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tailor_adapters::ProjectFs;
use tailor_core::splice::{collapse_nested, splice};
use tailor_core::{parses_cleanly, ProjectFile, Replacement, StructuralNode, StructuralSnapshot};

/// What to do when an edit breaks the structural snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationPolicy {
    /// Reject on any violation
    Strict,
    /// Re-insert missing import/export lines once, then reject
    #[default]
    Repair,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub relative_path: String,
    pub lines_changed: usize,
    pub repaired: bool,
    pub nodes_replaced: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NodeEditReply {
    Listed { replacements: Vec<NodeReplacement> },
    Mapped(BTreeMap<String, String>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeReplacement {
    #[serde(alias = "id")]
    node_id: String,
    #[serde(alias = "replacement", alias = "newCode")]
    code: String,
}

impl NodeEditReply {
    fn into_map(self) -> BTreeMap<String, String> {
        match self {
            NodeEditReply::Listed { replacements } => replacements
                .into_iter()
                .map(|r| (r.node_id.trim().to_string(), r.code))
                .collect(),
            NodeEditReply::Mapped(map) => map,
        }
    }
}

pub struct PatchApplier<'a> {
    service: &'a dyn ReasoningService,
    project: &'a ProjectFs,
    validation: ValidationPolicy,
    max_output: u32,
    temperature: f32,
}

impl<'a> PatchApplier<'a> {
    pub fn new(service: &'a dyn ReasoningService, project: &'a ProjectFs, max_output: u32, temperature: f32) -> Self {
        Self {
            service,
            project,
            validation: ValidationPolicy::default(),
            max_output,
            temperature,
        }
    }

    pub fn with_validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    pub(crate) fn service(&self) -> &'a dyn ReasoningService {
        self.service
    }

    pub(crate) fn project(&self) -> &'a ProjectFs {
        self.project
    }

    pub(crate) fn generation(&self) -> (u32, f32) {
        (self.max_output, self.temperature)
    }

    /// Replace the target nodes of one file using a single batched call.
    ///
    /// Nodes the reply leaves out, or answers with blank text, stay as they
    /// are.
    pub async fn apply_node_edits(
        &self,
        file: &mut ProjectFile,
        targets: &[StructuralNode],
        request: &str,
        reasoning: &str,
    ) -> Result<AppliedEdit, PatchError> {
        let targets = collapse_nested(targets.to_vec());
        if targets.is_empty() {
            return Err(PatchError::NoTargets(file.relative_path.clone()));
        }

        let target_bytes = targets.iter().map(|node| node.code_snippet.len()).sum();
        check_source_size(&file.relative_path, target_bytes)?;

        let prompt = prompts::node_edit_prompt(request, reasoning, &file.relative_path, &targets);
        let raw = self.service.complete(&prompt, self.max_output, self.temperature).await?;
        let answers = parse_structured_content::<NodeEditReply>(&raw)
            .map_err(|err| {
                tracing::warn!(file = %file.relative_path, reply = %sanitize_excerpt(&raw), "malformed node edit reply");
                err
            })?
            .into_map();

        let replacements: Vec<Replacement> = targets
            .iter()
            .filter_map(|node| {
                let code = answers.get(&node.id)?.trim();
                if code.is_empty() || code == node.code_snippet.trim() {
                    None
                } else {
                    Some(Replacement::for_node(node, code))
                }
            })
            .collect();
        if replacements.is_empty() {
            return Err(PatchError::NoChanges(file.relative_path.clone()));
        }

        let spliced = splice(&file.content, &replacements)?;
        let mut applied = self.commit(file, spliced)?;
        applied.nodes_replaced = replacements.len();
        Ok(applied)
    }

    /// Replace the whole file with the service's rewrite.
    pub async fn apply_full_file_rewrite(
        &self,
        file: &mut ProjectFile,
        request: &str,
        reasoning: &str,
    ) -> Result<AppliedEdit, PatchError> {
        check_source_size(&file.relative_path, file.content.len())?;
        let prompt = prompts::full_file_prompt(request, reasoning, &file.relative_path, &file.content);
        let raw = self.service.complete(&prompt, self.max_output, self.temperature).await?;
        let rewritten = extract_code(&raw)?;
        self.commit(file, rewritten)
    }

    /// Validate `edited` against the file's current content and write it.
    ///
    /// On error nothing is written and `file` is untouched.
    pub(crate) fn commit(&self, file: &mut ProjectFile, edited: String) -> Result<AppliedEdit, PatchError> {
        let path = file.relative_path.clone();
        let snapshot = StructuralSnapshot::capture(&file.content);

        let (checked, repaired) = match snapshot.validate(&edited) {
            Ok(()) => (edited, false),
            Err(failure) => {
                tracing::warn!(file = %path, violation = %failure, "edit broke the structural snapshot");
                let repaired = match self.validation {
                    ValidationPolicy::Repair if failure.is_repairable() => snapshot.repair(&file.content, &edited),
                    _ => None,
                };
                match repaired {
                    Some(content) => {
                        tracing::info!(file = %path, "restored missing import/export lines");
                        (content, true)
                    }
                    None => return Err(PatchError::Validation(failure)),
                }
            }
        };

        let source_path = Path::new(&path);
        if parses_cleanly(source_path, &file.content) && !parses_cleanly(source_path, &checked) {
            tracing::warn!(file = %path, "edited content does not parse");
            return Err(PatchError::Unparseable(path));
        }

        let normalized = normalize_generated_content(&file.content, checked, false);
        if normalized == file.content {
            return Err(PatchError::NoChanges(path));
        }

        self.project.write(&path, &normalized)?;
        let lines_changed = changed_line_count(&file.content, &normalized);
        file.update_content(normalized);
        tracing::info!(file = %path, lines_changed, repaired, "file updated");

        Ok(AppliedEdit {
            relative_path: path,
            lines_changed,
            repaired,
            nodes_replaced: 0,
        })
    }
}

/// Lines between the common prefix and the common suffix, on the longer side.
/// Refuse sources too large to send whole in one prompt.
pub(crate) fn check_source_size(path: &str, bytes: usize) -> Result<(), PatchError> {
    if bytes > prompts::MAX_EDIT_SOURCE_BYTES {
        return Err(PatchError::TooLarge {
            path: path.to_string(),
            bytes,
            limit: prompts::MAX_EDIT_SOURCE_BYTES,
        });
    }
    Ok(())
}

pub(crate) fn changed_line_count(before: &str, after: &str) -> usize {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();
    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    (old.len() - prefix - suffix).max(new.len() - prefix - suffix)
}
