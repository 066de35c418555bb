//! Top-level driver and fallback chain
//!
//! CLASSIFYING -> EXECUTING(strategy) -> SUCCEEDED, or on any failure
//! ESCALATING to component creation and then to the emergency stub. Each
//! stage runs behind `catch_unwind`, so a panic is one more failure to
//! escalate from. Only a failed emergency stub yields `success: false`.

use crate::classifier::{ClassifierPolicy, ScopeClassifier};
use crate::component::{write_emergency_stub, ComponentOutcome, ComponentSpec};
use crate::error::EngineError;
use crate::llm::{service_from_config, ReasoningService, WithDeadline};
use crate::patch::{PatchApplier, ValidationPolicy};
use crate::relevance::{admit, select_candidates, RelevanceScorer};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tailor_adapters::{
    Config, ConversationRecord, ConversationStore, JsonlConversationStore, MokaKvCache, PathPolicy, ProjectFs,
    SessionContext, SessionSettings, SessionStore,
};
use tailor_core::heuristics::{derive_component_name, infer_component_type};
use tailor_core::{
    Approach, ChangeType, FileMap, ModificationChange, ModificationRequest, ModificationResult, ModificationScope,
    Strategy,
};

/// Most files listed in the project summary given to the classifier
const MAX_SUMMARY_FILES: usize = 60;

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub admission_threshold: u8,
    pub max_candidate_files: usize,
    pub max_output_tokens: u32,
    pub classify_temperature: f32,
    pub scoring_temperature: f32,
    pub generation_temperature: f32,
    pub classifier: ClassifierPolicy,
    pub path_policy: PathPolicy,
    pub validation: ValidationPolicy,
    /// Deadline for every reasoning-service call
    pub call_deadline: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            admission_threshold: config.admission_threshold,
            max_candidate_files: config.max_candidate_files,
            max_output_tokens: config.max_output_tokens,
            classify_temperature: config.classify_temperature,
            scoring_temperature: config.scoring_temperature,
            generation_temperature: config.generation_temperature,
            classifier: ClassifierPolicy {
                fallback_confidence: config.heuristic_fallback_confidence,
                disagreement_confidence: config.heuristic_disagreement_confidence,
            },
            path_policy: PathPolicy::default(),
            validation: ValidationPolicy::default(),
            call_deadline: config.request_timeout(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What one executed stage produced
#[derive(Debug, Clone, PartialEq, Eq)]
struct StageOutcome {
    approach: Approach,
    selected_files: Vec<String>,
    added_files: Vec<String>,
    reasoning: String,
}

pub struct Orchestrator {
    service: Arc<dyn ReasoningService>,
    sessions: Arc<SessionStore>,
    conversations: Arc<dyn ConversationStore>,
    settings: EngineSettings,
}

impl Orchestrator {
    /// Every call made through `service` is bounded by `settings.call_deadline`.
    pub fn new(
        service: Arc<dyn ReasoningService>,
        sessions: Arc<SessionStore>,
        conversations: Arc<dyn ConversationStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            service: Arc::new(WithDeadline::new(service, settings.call_deadline)),
            sessions,
            conversations,
            settings,
        }
    }

    /// Production wiring: OpenRouter client, in-process cache, JSONL conversations.
    ///
    /// A client that cannot be built (no API key) does not stop the engine:
    /// every call fails and requests run through the offline fallbacks.
    pub fn from_config(config: &Config) -> Self {
        let service = service_from_config(config);
        let sessions = SessionStore::new(
            Arc::new(MokaKvCache::default()),
            SessionSettings {
                ttl: config.cache_ttl(),
                recent_changes: config.recent_changes_in_summary,
                retention: config.change_log_retention,
            },
        );
        Self::new(
            service,
            Arc::new(sessions),
            Arc::new(JsonlConversationStore),
            EngineSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run one request to a terminal result. Never returns an error: failures
    /// escalate through the fallback chain and end up in the result.
    pub async fn handle(&self, request: ModificationRequest) -> ModificationResult {
        let project = ProjectFs::new(&request.project_root, self.settings.path_policy);
        let mut session = self.sessions.lock(&request.session_id, project.clone()).await;
        tracing::info!(session = %request.session_id, root = %project.root().display(), "handling request");

        let mut files = match session.get_files().await {
            Ok(files) => files,
            Err(err) => {
                tracing::warn!(error = %err, "could not load project files");
                FileMap::new()
            }
        };

        let history = match self.conversations.latest_active_summary(project.root()).await {
            Ok(history) => history,
            Err(err) => {
                tracing::warn!(error = %err, "conversation history unavailable");
                None
            }
        };
        let context = conversation_context(history.as_deref(), &session);

        tracing::info!(state = "CLASSIFYING");
        let classifier = ScopeClassifier::new(
            self.service.as_ref(),
            self.settings.max_output_tokens,
            self.settings.classify_temperature,
            self.settings.classifier,
        );
        let scope = classifier.classify(&request.prompt, &project_summary(&files), &context).await;

        tracing::info!(state = "EXECUTING", strategy = %scope.strategy);
        let executed = AssertUnwindSafe(self.execute(&scope, &request.prompt, &project, &mut files, &mut session))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::Panicked(panic_message(panic))));

        let mut errors = Vec::new();
        let outcome = match executed {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(state = "ESCALATING", error = %err, next = %Approach::ComponentFallback, "strategy failed");
                errors.push(format!("{}: {}", Approach::from(scope.strategy), err));
                self.component_fallback(&scope, &request.prompt, &project, &mut files, &mut session)
                    .await
            }
        };

        let outcome = match outcome {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(state = "ESCALATING", error = %err, next = %Approach::EmergencyFallback, "component fallback failed");
                errors.push(format!("{}: {}", Approach::ComponentFallback, err));
                self.emergency(&request.prompt, &project, &mut files, &mut session).await
            }
        };

        let result = match outcome {
            Ok(outcome) => {
                let mut reasoning = outcome.reasoning;
                if !errors.is_empty() {
                    reasoning.push_str(&format!(" (Escalated after: {}.)", errors.join("; ")));
                }
                tracing::info!(state = "SUCCEEDED", approach = %outcome.approach);
                ModificationResult {
                    success: true,
                    selected_files: outcome.selected_files,
                    added_files: outcome.added_files,
                    approach: outcome.approach,
                    reasoning,
                    modification_summary: session.recent_changes_summary(),
                    error: None,
                }
            }
            Err(err) => {
                errors.push(format!("{}: {}", Approach::EmergencyFallback, err));
                tracing::error!(errors = ?errors, "every stage failed");
                ModificationResult {
                    success: false,
                    selected_files: Vec::new(),
                    added_files: Vec::new(),
                    approach: Approach::EmergencyFallback,
                    reasoning: scope.reasoning.clone(),
                    modification_summary: session.recent_changes_summary(),
                    error: Some(errors.join("; ")),
                }
            }
        };

        self.record_conversation(&request, &project, &result).await;
        result
    }

    async fn execute(
        &self,
        scope: &ModificationScope,
        prompt: &str,
        project: &ProjectFs,
        files: &mut FileMap,
        session: &mut SessionContext,
    ) -> Result<StageOutcome, EngineError> {
        match scope.strategy {
            Strategy::NodeEdit | Strategy::FullFile => self.execute_edits(scope, prompt, project, files, session).await,
            Strategy::ComponentAddition => {
                let spec = ComponentSpec {
                    name: scope.component_name.clone().unwrap_or_else(|| derive_component_name(prompt)),
                    component_type: scope.component_type.unwrap_or_else(|| infer_component_type(prompt)),
                    request: prompt.to_string(),
                    reasoning: scope.reasoning.clone(),
                };
                self.create(spec, Approach::ComponentAddition, &scope.reasoning, project, files, session)
                    .await
            }
        }
    }

    /// Score candidates, admit, then patch admitted files one after another.
    async fn execute_edits(
        &self,
        scope: &ModificationScope,
        prompt: &str,
        project: &ProjectFs,
        files: &mut FileMap,
        session: &mut SessionContext,
    ) -> Result<StageOutcome, EngineError> {
        let approach = Approach::from(scope.strategy);
        let threshold = self.settings.admission_threshold;

        let results = {
            let candidates = select_candidates(files, prompt, scope.strategy, self.settings.max_candidate_files);
            tracing::debug!(candidates = candidates.len(), "scoring candidate files");
            let scorer = RelevanceScorer::new(
                self.service.as_ref(),
                self.settings.max_output_tokens,
                self.settings.scoring_temperature,
            );
            scorer
                .score_all(prompt, &candidates, scope.strategy, &scope.reasoning)
                .await
        };
        let admitted = admit(&results, threshold);
        tracing::info!(
            scored = results.len(),
            admitted = admitted.len(),
            threshold,
            files = ?admitted.iter().map(|r| r.file_path.as_str()).collect::<Vec<_>>(),
            "admission decided"
        );
        if admitted.is_empty() {
            return Err(EngineError::NothingAdmitted { threshold });
        }

        let applier = PatchApplier::new(
            self.service.as_ref(),
            project,
            self.settings.max_output_tokens,
            self.settings.generation_temperature,
        )
        .with_validation(self.settings.validation);

        let mut selected = Vec::new();
        let mut failures = Vec::new();
        for relevance in &admitted {
            let path = relevance.file_path.clone();
            let reasoning = if relevance.reasoning.is_empty() {
                scope.reasoning.clone()
            } else {
                relevance.reasoning.clone()
            };

            let applied = {
                let Some(file) = files.get_mut(&path) else {
                    failures.push(format!("{}: not in the file map", path));
                    continue;
                };
                match scope.strategy {
                    Strategy::NodeEdit => {
                        applier
                            .apply_node_edits(file, &relevance.target_nodes, prompt, &reasoning)
                            .await
                    }
                    _ => applier.apply_full_file_rewrite(file, prompt, &reasoning).await,
                }
            };

            match applied {
                Ok(edit) => {
                    let change = ModificationChange::new(ChangeType::Modified, &path, truncate(prompt), approach)
                        .with_details(Some(edit.lines_changed), Some(reasoning));
                    session.append_change(change).await;
                    session.set_files(files).await;
                    selected.push(path);
                }
                Err(err) => {
                    tracing::warn!(file = %path, error = %err, "edit rejected; file left unchanged");
                    session
                        .append_change(ModificationChange::failed(&path, err.to_string(), approach))
                        .await;
                    failures.push(format!("{}: {}", path, err));
                }
            }
        }

        if selected.is_empty() {
            return Err(EngineError::NothingApplied(failures.join("; ")));
        }
        Ok(StageOutcome {
            approach,
            selected_files: selected,
            added_files: Vec::new(),
            reasoning: scope.reasoning.clone(),
        })
    }

    async fn create(
        &self,
        spec: ComponentSpec,
        approach: Approach,
        reasoning: &str,
        project: &ProjectFs,
        files: &mut FileMap,
        session: &mut SessionContext,
    ) -> Result<StageOutcome, EngineError> {
        let applier = PatchApplier::new(
            self.service.as_ref(),
            project,
            self.settings.max_output_tokens,
            self.settings.generation_temperature,
        )
        .with_validation(self.settings.validation);

        let outcome: ComponentOutcome = applier.create_component(files, &spec).await?;
        session
            .append_change(
                ModificationChange::new(
                    ChangeType::Created,
                    &outcome.generated_file,
                    format!("{} {}", spec.component_type, outcome.name),
                    approach,
                )
                .with_details(None, Some(reasoning.to_string())),
            )
            .await;
        for updated in &outcome.updated_files {
            session
                .append_change(ModificationChange::new(
                    ChangeType::Updated,
                    updated,
                    format!("route for {}", outcome.name),
                    approach,
                ))
                .await;
        }
        session.set_files(files).await;

        tracing::info!(file = %outcome.generated_file, route = ?outcome.route_update, "component stage finished");
        Ok(StageOutcome {
            approach,
            selected_files: outcome.updated_files,
            added_files: vec![outcome.generated_file],
            reasoning: reasoning.to_string(),
        })
    }

    async fn component_fallback(
        &self,
        scope: &ModificationScope,
        prompt: &str,
        project: &ProjectFs,
        files: &mut FileMap,
        session: &mut SessionContext,
    ) -> Result<StageOutcome, EngineError> {
        let spec = ComponentSpec {
            name: scope.component_name.clone().unwrap_or_else(|| derive_component_name(prompt)),
            component_type: scope.component_type.unwrap_or_else(|| infer_component_type(prompt)),
            request: prompt.to_string(),
            reasoning: scope.reasoning.clone(),
        };
        let reasoning = format!(
            "Could not apply {}; created a {} instead.",
            scope.strategy, spec.component_type
        );
        AssertUnwindSafe(self.create(spec, Approach::ComponentFallback, &reasoning, project, files, session))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(EngineError::Panicked(panic_message(panic))))
    }

    async fn emergency(
        &self,
        prompt: &str,
        project: &ProjectFs,
        files: &mut FileMap,
        session: &mut SessionContext,
    ) -> Result<StageOutcome, EngineError> {
        let path = write_emergency_stub(project, files, prompt)?;
        session
            .append_change(ModificationChange::new(
                ChangeType::Created,
                &path,
                "emergency stub component",
                Approach::EmergencyFallback,
            ))
            .await;
        session.set_files(files).await;
        Ok(StageOutcome {
            approach: Approach::EmergencyFallback,
            selected_files: Vec::new(),
            added_files: vec![path],
            reasoning: "Every generated change failed; wrote a minimal stub component.".to_string(),
        })
    }

    async fn record_conversation(&self, request: &ModificationRequest, project: &ProjectFs, result: &ModificationResult) {
        if !project.root().is_dir() {
            return;
        }
        let mut record = ConversationRecord::new(&request.session_id, &request.prompt, result.approach, result.success);
        record.files = result
            .selected_files
            .iter()
            .chain(&result.added_files)
            .cloned()
            .collect();
        record.summary = result.reasoning.clone();
        if let Err(err) = self.conversations.append_record(project.root(), &record).await {
            tracing::warn!(error = %err, "conversation record not stored");
        }
    }
}

fn truncate(prompt: &str) -> String {
    crate::llm::parse::truncate_str(prompt.trim(), 120).to_string()
}

/// Source files, entrypoints first, for the classifier.
pub fn project_summary(files: &FileMap) -> String {
    let mut sources: Vec<_> = files.values().filter(|file| file.file_type.is_source()).collect();
    sources.sort_by_key(|file| (!file.is_main_file, file.relative_path.clone()));
    let mut summary: Vec<String> = sources
        .iter()
        .take(MAX_SUMMARY_FILES)
        .map(|file| format!("{} ({} lines)", file.relative_path, file.line_count))
        .collect();
    if sources.len() > MAX_SUMMARY_FILES {
        summary.push(format!("... and {} more", sources.len() - MAX_SUMMARY_FILES));
    }
    summary.join("\n")
}

fn conversation_context(history: Option<&str>, session: &SessionContext) -> String {
    let mut parts = Vec::new();
    if let Some(history) = history.filter(|h| !h.trim().is_empty()) {
        parts.push(history.to_string());
    }
    if session.change_log().total_changes() > 0 {
        parts.push(session.recent_changes_summary());
    }
    parts.join("\n\n")
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
