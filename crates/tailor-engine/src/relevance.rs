//! Relevance scoring: which files (and which nodes in them) a request touches
//!
//! One reasoning call per candidate file, issued concurrently. A malformed or
//! failed reply scores the file 0 and not relevant; nothing is guessed.

use crate::llm::parse::sanitize_excerpt;
use crate::llm::{parse_structured_content, prompts, ReasoningService};
use futures::future::join_all;
use serde::Deserialize;
use std::cmp::Reverse;
use std::path::Path;
use tailor_core::heuristics::request_terms;
use tailor_core::{parse_for_path, FileMap, ProjectFile, RelevanceResult, StructuralNode, Strategy};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelevanceReply {
    #[serde(default)]
    is_relevant: bool,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    target_node_ids: Vec<String>,
}

pub struct RelevanceScorer<'a> {
    service: &'a dyn ReasoningService,
    max_output: u32,
    temperature: f32,
}

impl<'a> RelevanceScorer<'a> {
    pub fn new(service: &'a dyn ReasoningService, max_output: u32, temperature: f32) -> Self {
        Self {
            service,
            max_output,
            temperature,
        }
    }

    /// Score one file against the request.
    ///
    /// For node-level strategies the file's nodes are listed and the reply must
    /// name at least one of them; a file without nodes is excluded without a
    /// call.
    pub async fn score(
        &self,
        request: &str,
        file: &ProjectFile,
        nodes: &[StructuralNode],
        strategy: Strategy,
        project_context: &str,
    ) -> RelevanceResult {
        let path = file.relative_path.as_str();
        if strategy.targets_nodes() && nodes.is_empty() {
            tracing::debug!(file = path, "no structural nodes; excluded from node edits");
            return RelevanceResult::not_relevant(path, "file has no structural nodes");
        }

        let prompt = prompts::relevance_prompt(request, strategy, path, &file.content, nodes, project_context);
        let raw = match self.service.complete(&prompt, self.max_output, self.temperature).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(file = path, error = %err, "relevance scoring failed");
                return RelevanceResult::not_relevant(path, format!("scoring failed: {}", err));
            }
        };

        let reply = match parse_structured_content::<RelevanceReply>(&raw) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(file = path, error = %err, reply = %sanitize_excerpt(&raw), "malformed relevance reply");
                return RelevanceResult::not_relevant(path, "relevance reply was malformed");
            }
        };

        let score = reply.score.clamp(0.0, 100.0).round() as u8;
        let mut result = RelevanceResult {
            file_path: path.to_string(),
            is_relevant: reply.is_relevant,
            score,
            reasoning: reply.reasoning,
            target_nodes: Vec::new(),
        };

        if strategy.targets_nodes() {
            result.target_nodes = resolve_targets(nodes, &reply.target_node_ids);
            if result.is_relevant && result.target_nodes.is_empty() {
                tracing::debug!(file = path, ids = ?reply.target_node_ids, "relevant file named no known nodes");
                result.is_relevant = false;
                result.reasoning.push_str(" (no valid target nodes)");
            }
        }

        tracing::debug!(
            file = path,
            relevant = result.is_relevant,
            score = result.score,
            targets = result.target_nodes.len(),
            "scored file"
        );
        result
    }

    /// Score every candidate concurrently. Results come back in candidate order.
    pub async fn score_all(
        &self,
        request: &str,
        candidates: &[&ProjectFile],
        strategy: Strategy,
        project_context: &str,
    ) -> Vec<RelevanceResult> {
        let parsed: Vec<Vec<StructuralNode>> = candidates
            .iter()
            .map(|file| parse_for_path(Path::new(&file.relative_path), &file.content))
            .collect();

        join_all(
            candidates
                .iter()
                .zip(parsed.iter())
                .map(|(file, nodes)| self.score(request, file, nodes, strategy, project_context)),
        )
        .await
    }
}

fn resolve_targets(nodes: &[StructuralNode], ids: &[String]) -> Vec<StructuralNode> {
    nodes
        .iter()
        .filter(|node| ids.iter().any(|id| id.trim() == node.id))
        .cloned()
        .collect()
}

/// Files admitted for editing, best score first.
///
/// Admission is decided per result against one threshold, so the admitted
/// set does not depend on scoring order.
pub fn admit(results: &[RelevanceResult], threshold: u8) -> Vec<RelevanceResult> {
    let mut admitted: Vec<RelevanceResult> = results
        .iter()
        .filter(|result| result.is_admitted(threshold))
        .cloned()
        .collect();
    admitted.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.file_path.cmp(&b.file_path)));
    admitted
}

/// Rank source files by token overlap with the request and keep the top `max`.
///
/// Path matches weigh more than content matches; entrypoints break ties.
/// Whole-file rewrites always consider the root composition file.
pub fn select_candidates<'f>(
    files: &'f FileMap,
    request: &str,
    strategy: Strategy,
    max: usize,
) -> Vec<&'f ProjectFile> {
    let terms = request_terms(request);
    let mut ranked: Vec<(u32, &ProjectFile)> = files
        .values()
        .filter(|file| file.file_type.is_source())
        .map(|file| (overlap_score(file, &terms), file))
        .collect();
    ranked.sort_by_key(|(score, file)| (Reverse(*score), Reverse(file.is_main_file), file.relative_path.clone()));

    let mut selected: Vec<&ProjectFile> = ranked.into_iter().take(max).map(|(_, file)| file).collect();
    if strategy == Strategy::FullFile {
        if let Some(root) = tailor_core::project::root_composition_file(files) {
            if !selected.iter().any(|file| file.relative_path == root.relative_path) {
                selected.push(root);
            }
        }
    }
    selected
}

fn overlap_score(file: &ProjectFile, terms: &[String]) -> u32 {
    let path = file.relative_path.to_lowercase();
    let content = file.content.to_lowercase();
    terms
        .iter()
        .map(|term| {
            let mut points = 0;
            if path.contains(term.as_str()) {
                points += 3;
            }
            if content.contains(term.as_str()) {
                points += 1;
            }
            points
        })
        .sum()
}
