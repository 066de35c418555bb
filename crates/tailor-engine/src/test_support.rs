//! Scripted reasoning service for unit tests

use crate::error::LlmError;
use crate::llm::ReasoningService;
use async_trait::async_trait;
use std::sync::Mutex;

struct Rule {
    task: &'static str,
    needle: Option<String>,
    reply: Result<String, LlmError>,
}

/// Answers each prompt with the first rule whose task tag (and optional
/// needle) it contains; unmatched prompts fail as a network error.
#[derive(Default)]
pub(crate) struct ScriptedService {
    rules: Vec<Rule>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, task: &'static str, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            task,
            needle: None,
            reply: Ok(reply.into()),
        });
        self
    }

    pub fn on_matching(mut self, task: &'static str, needle: &str, reply: impl Into<String>) -> Self {
        self.rules.push(Rule {
            task,
            needle: Some(needle.to_string()),
            reply: Ok(reply.into()),
        });
        self
    }

    pub fn failing(mut self, task: &'static str, err: LlmError) -> Self {
        self.rules.push(Rule {
            task,
            needle: None,
            reply: Err(err),
        });
        self
    }

    pub fn calls_for(&self, task: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|p| p.starts_with(task)).count())
            .unwrap_or(0)
    }

    pub fn prompts_for(&self, task: &str) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|p| p.starts_with(task)).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReasoningService for ScriptedService {
    async fn complete(&self, prompt: &str, _max_output: u32, _temperature: f32) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(prompt.to_string());
        }
        self.rules
            .iter()
            .find(|rule| {
                prompt.starts_with(rule.task)
                    && rule.needle.as_deref().map_or(true, |needle| prompt.contains(needle))
            })
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| Err(LlmError::Network("no scripted reply".to_string())))
    }
}
