//! Modification engine for tailor
//!
//! Classifies a natural-language change request, scores project files for
//! relevance, generates and validates patches through a reasoning service,
//! and escalates through component creation to an emergency stub when a
//! strategy fails.

pub mod classifier;
pub mod component;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod patch;
pub mod relevance;

#[cfg(test)]
mod test_support;

pub use classifier::{ClassifierPolicy, ScopeClassifier, ServiceVerdict};
pub use component::{write_emergency_stub, ComponentOutcome, ComponentSpec, RouteUpdate};
pub use error::{EngineError, LlmError, PatchError, ReplyError};
pub use llm::{service_from_config, OpenRouterClient, ReasoningService, UnavailableService, WithDeadline};
pub use orchestrator::{EngineSettings, Orchestrator};
pub use patch::{AppliedEdit, PatchApplier, ValidationPolicy};
pub use relevance::{admit, select_candidates, RelevanceScorer};
