//! Scope classification: keyword heuristic plus a confirming service call
//!
//! The heuristic always produces an answer offline. The service answer wins
//! whenever it is usable; the heuristic only stands in when the service
//! fails, and only if it is confident enough.

use crate::error::ReplyError;
use crate::llm::parse::sanitize_excerpt;
use crate::llm::{parse_structured_content, prompts, ReasoningService};
use serde::Deserialize;
use tailor_core::heuristics::{derive_component_name, infer_component_type, suggest_strategy, to_pascal_case};
use tailor_core::{ComponentType, HeuristicSuggestion, ModificationScope, Strategy};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyReply {
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    component_name: Option<String>,
    #[serde(default)]
    component_type: Option<String>,
}

/// A usable classification from the reasoning service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVerdict {
    pub strategy: Strategy,
    pub reasoning: String,
    pub component_name: Option<String>,
    pub component_type: Option<ComponentType>,
}

impl TryFrom<ClassifyReply> for ServiceVerdict {
    type Error = ReplyError;

    fn try_from(reply: ClassifyReply) -> Result<Self, Self::Error> {
        let raw = reply.strategy.unwrap_or_default();
        let strategy = Strategy::parse_loose(&raw).ok_or_else(|| ReplyError::invalid_field("strategy", raw))?;
        let component_name = reply
            .component_name
            .map(|name| to_pascal_case(&name))
            .filter(|name| !name.is_empty());
        Ok(Self {
            strategy,
            reasoning: reply.reasoning.trim().to_string(),
            component_name,
            component_type: reply.component_type.as_deref().and_then(ComponentType::parse_loose),
        })
    }
}

/// Confidence cut-offs for the heuristic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierPolicy {
    /// Above this the heuristic replaces a failed service reply
    pub fallback_confidence: u8,
    /// Above this a disagreement with the service is noted in the reasoning
    pub disagreement_confidence: u8,
}

impl Default for ClassifierPolicy {
    fn default() -> Self {
        Self {
            fallback_confidence: 60,
            disagreement_confidence: 80,
        }
    }
}

pub struct ScopeClassifier<'a> {
    service: &'a dyn ReasoningService,
    max_output: u32,
    temperature: f32,
    policy: ClassifierPolicy,
}

impl<'a> ScopeClassifier<'a> {
    pub fn new(service: &'a dyn ReasoningService, max_output: u32, temperature: f32, policy: ClassifierPolicy) -> Self {
        Self {
            service,
            max_output,
            temperature,
            policy,
        }
    }

    /// Decide the strategy for a request. Never fails: every service problem
    /// degrades to the heuristic or to a node edit.
    pub async fn classify(&self, request: &str, project_summary: &str, conversation_context: &str) -> ModificationScope {
        let heuristic = suggest_strategy(request);
        tracing::debug!(
            strategy = %heuristic.strategy,
            confidence = heuristic.confidence,
            scores = ?heuristic.scores,
            "heuristic suggestion"
        );

        let prompt = prompts::classify_prompt(request, project_summary, conversation_context, &heuristic);
        let verdict = match self.service.complete(&prompt, self.max_output, self.temperature).await {
            Ok(raw) => parse_structured_content::<ClassifyReply>(&raw)
                .and_then(ServiceVerdict::try_from)
                .map_err(|err| {
                    tracing::warn!(error = %err, reply = %sanitize_excerpt(&raw), "unusable classification reply");
                    err.to_string()
                }),
            Err(err) => {
                tracing::warn!(error = %err, "classification call failed");
                Err(err.to_string())
            }
        };

        let scope = resolve(request, &heuristic, verdict, self.policy);
        tracing::info!(strategy = %scope.strategy, component = ?scope.component_name, "request classified");
        scope
    }
}

/// Combine the heuristic with the service outcome.
pub fn resolve(
    request: &str,
    heuristic: &HeuristicSuggestion,
    verdict: Result<ServiceVerdict, String>,
    policy: ClassifierPolicy,
) -> ModificationScope {
    let (mut scope, service_component) = match verdict {
        Err(reason) if heuristic.confidence > policy.fallback_confidence => (
            ModificationScope::new(
                heuristic.strategy,
                format!(
                    "Service classification unavailable ({}); using keyword heuristic {} (confidence {}).",
                    reason, heuristic.strategy, heuristic.confidence
                ),
            ),
            None,
        ),
        Err(reason) => (
            ModificationScope::new(
                Strategy::NodeEdit,
                format!(
                    "Service classification unavailable ({}); heuristic confidence {} is too low. \
                     Defaulting to {} with degraded confidence.",
                    reason,
                    heuristic.confidence,
                    Strategy::NodeEdit
                ),
            ),
            None,
        ),
        Ok(verdict) => {
            let mut reasoning = if verdict.reasoning.is_empty() {
                format!("Service chose {}.", verdict.strategy)
            } else {
                verdict.reasoning
            };
            if verdict.strategy != heuristic.strategy && heuristic.confidence > policy.disagreement_confidence {
                reasoning.push_str(&format!(
                    " (Keyword heuristic suggested {} with confidence {}; service decision kept.)",
                    heuristic.strategy, heuristic.confidence
                ));
            }
            (
                ModificationScope::new(verdict.strategy, reasoning),
                Some((verdict.component_name, verdict.component_type)),
            )
        }
    };

    if scope.strategy == Strategy::ComponentAddition {
        let (name, component_type) = service_component.unwrap_or((None, None));
        scope = scope.with_component(
            name.unwrap_or_else(|| derive_component_name(request)),
            component_type.unwrap_or_else(|| infer_component_type(request)),
        );
    }
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::test_support::ScriptedService;
    use tailor_core::heuristics::BucketScores;

    fn heuristic(strategy: Strategy, confidence: u8) -> HeuristicSuggestion {
        HeuristicSuggestion {
            strategy,
            confidence,
            scores: BucketScores::default(),
        }
    }

    fn verdict(strategy: Strategy) -> Result<ServiceVerdict, String> {
        Ok(ServiceVerdict {
            strategy,
            reasoning: "service reasoning".to_string(),
            component_name: None,
            component_type: None,
        })
    }

    #[tokio::test]
    async fn agreeing_service_confirms_node_edit() {
        let service = ScriptedService::new().on(
            prompts::CLASSIFY_TASK,
            r#"{"strategy": "NODE_EDIT", "reasoning": "single button color"}"#,
        );
        let classifier = ScopeClassifier::new(&service, 512, 0.1, ClassifierPolicy::default());
        let scope = classifier.classify("make the signup button red", "", "").await;
        assert_eq!(scope.strategy, Strategy::NodeEdit);
        assert_eq!(scope.reasoning, "single button color");
        assert_eq!(scope.component_name, None);
    }

    #[tokio::test]
    async fn service_names_the_new_page() {
        let service = ScriptedService::new().on(
            prompts::CLASSIFY_TASK,
            "```json\n{\"strategy\": \"COMPONENT_ADDITION\", \"reasoning\": \"new page\", \"componentName\": \"about\", \"componentType\": \"page\"}\n```",
        );
        let classifier = ScopeClassifier::new(&service, 512, 0.1, ClassifierPolicy::default());
        let scope = classifier.classify("add a new About page", "", "").await;
        assert_eq!(scope.strategy, Strategy::ComponentAddition);
        assert_eq!(scope.component_name.as_deref(), Some("About"));
        assert_eq!(scope.component_type, Some(ComponentType::Page));
    }

    #[tokio::test]
    async fn failed_service_falls_back_to_confident_heuristic() {
        let service = ScriptedService::new().failing(prompts::CLASSIFY_TASK, LlmError::EmptyReply);
        let classifier = ScopeClassifier::new(&service, 512, 0.1, ClassifierPolicy::default());
        let scope = classifier.classify("make the signup button red", "", "").await;
        assert_eq!(scope.strategy, Strategy::NodeEdit);
        assert!(scope.reasoning.contains("keyword heuristic"));
    }

    #[test]
    fn low_confidence_without_service_defaults_to_node_edit() {
        let scope = resolve(
            "rework everything",
            &heuristic(Strategy::FullFile, 60),
            Err("timeout".to_string()),
            ClassifierPolicy::default(),
        );
        assert_eq!(scope.strategy, Strategy::NodeEdit);
        assert!(scope.reasoning.contains("degraded confidence"));
    }

    #[test]
    fn out_of_enum_strategy_is_unusable() {
        let reply = ClassifyReply {
            strategy: Some("DELETE_EVERYTHING".to_string()),
            reasoning: String::new(),
            component_name: None,
            component_type: None,
        };
        assert_eq!(
            ServiceVerdict::try_from(reply),
            Err(ReplyError::invalid_field("strategy", "DELETE_EVERYTHING"))
        );
    }

    #[test]
    fn confident_disagreement_is_noted_but_service_wins() {
        let scope = resolve(
            "make the button red",
            &heuristic(Strategy::NodeEdit, 85),
            verdict(Strategy::FullFile),
            ClassifierPolicy::default(),
        );
        assert_eq!(scope.strategy, Strategy::FullFile);
        assert!(scope.reasoning.contains("suggested NODE_EDIT with confidence 85"));

        let quiet = resolve(
            "make the button red",
            &heuristic(Strategy::NodeEdit, 80),
            verdict(Strategy::FullFile),
            ClassifierPolicy::default(),
        );
        assert_eq!(quiet.reasoning, "service reasoning");
    }

    #[test]
    fn heuristic_component_gets_derived_name_and_type() {
        let scope = resolve(
            "create a contact page",
            &heuristic(Strategy::ComponentAddition, 75),
            Err("malformed".to_string()),
            ClassifierPolicy::default(),
        );
        assert_eq!(scope.strategy, Strategy::ComponentAddition);
        assert_eq!(scope.component_name.as_deref(), Some("Contact"));
        assert_eq!(scope.component_type, Some(ComponentType::Page));
    }
}
