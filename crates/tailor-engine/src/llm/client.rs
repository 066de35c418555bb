//! Reasoning service client
//!
//! The engine only needs one primitive: send a prompt, get text back within a
//! deadline. [`ReasoningService`] is that seam; [`OpenRouterClient`] is the
//! production implementation and tests script their own.

use super::parse::{sanitize_excerpt, truncate_str};
use crate::error::LlmError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tailor_adapters::Config;

/// Rate limit retry configuration
pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const INITIAL_BACKOFF_MS: u64 = 2000;
pub(crate) const BACKOFF_MULTIPLIER: u64 = 2;

const SYSTEM_PREAMBLE: &str = "You are a careful code modification assistant for JSX/TSX web projects. \
Follow the output format each task asks for exactly. Never add commentary outside it.";

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn complete(&self, prompt: &str, max_output: u32, temperature: f32) -> Result<String, LlmError>;
}

#[async_trait]
impl<S: ReasoningService + ?Sized> ReasoningService for Arc<S> {
    async fn complete(&self, prompt: &str, max_output: u32, temperature: f32) -> Result<String, LlmError> {
        (**self).complete(prompt, max_output, temperature).await
    }
}

/// Bounds every call of the wrapped service by one deadline
pub struct WithDeadline<S> {
    inner: S,
    deadline: Duration,
}

impl<S> WithDeadline<S> {
    pub fn new(inner: S, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl<S: ReasoningService> ReasoningService for WithDeadline<S> {
    async fn complete(&self, prompt: &str, max_output: u32, temperature: f32) -> Result<String, LlmError> {
        match tokio::time::timeout(self.deadline, self.inner.complete(prompt, max_output, temperature)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.deadline)),
        }
    }
}

/// Stands in for a client that could not be built; every call fails with
/// the same error so the caller's fallbacks still run.
pub struct UnavailableService {
    reason: LlmError,
}

impl UnavailableService {
    pub fn new(reason: LlmError) -> Self {
        Self { reason }
    }
}

#[async_trait]
impl ReasoningService for UnavailableService {
    async fn complete(&self, _prompt: &str, _max_output: u32, _temperature: f32) -> Result<String, LlmError> {
        Err(self.reason.clone())
    }
}

/// The configured client, or an [`UnavailableService`] carrying why it
/// could not be built.
pub fn service_from_config(config: &Config) -> Arc<dyn ReasoningService> {
    match OpenRouterClient::from_config(config) {
        Ok(client) => Arc::new(client),
        Err(err) => {
            tracing::warn!(error = %err, "reasoning service unavailable; only offline fallbacks will run");
            Arc::new(UnavailableService::new(err))
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    /// Content can be null when a refusal or upstream error occurs
    #[serde(default)]
    content: Option<String>,
    /// Set when content is blocked by moderation
    #[serde(default)]
    refusal: Option<String>,
}

/// OpenRouter error response (can come with 200 status for upstream errors)
#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

/// OpenAI-compatible chat completions client (OpenRouter by default)
pub struct OpenRouterClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl OpenRouterClient {
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key = config.api_key().ok_or(LlmError::MissingApiKey)?;
        Ok(Self {
            http: create_http_client(config.request_timeout())?,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    /// Send a request with automatic retry on transient failures.
    ///
    /// Handles:
    /// - Network errors (timeout, connection failures)
    /// - Rate limits (429)
    /// - Server errors (5xx)
    /// - OpenRouter's 200-with-error responses
    async fn send_with_retry<T: Serialize + Sync>(&self, request_body: &T) -> Result<String, LlmError> {
        let mut retry_count = 0;

        loop {
            let response = match self
                .http
                .post(&self.api_url)
                .header("Content-Type", "application/json")
                .header("X-Title", "Tailor")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(request_body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        wait_before_retry(retry_count, None).await;
                        continue;
                    }
                    return Err(map_network_error(err));
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        wait_before_retry(retry_count, None).await;
                        continue;
                    }
                    return Err(map_network_error(err));
                }
            };

            if status.is_success() {
                if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(&text) {
                    let is_retryable = err_resp.error.code.map(|c| c >= 500 || c == 429).unwrap_or(true);
                    if is_retryable && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        wait_before_retry(retry_count, None).await;
                        continue;
                    }
                    return Err(LlmError::Api {
                        status: err_resp.error.code.and_then(|c| u16::try_from(c).ok()).unwrap_or(200),
                        message: truncate_str(&err_resp.error.message, 200).to_string(),
                    });
                }
                return Ok(text);
            }

            let code = status.as_u16();
            if (code == 429 || status.is_server_error()) && retry_count < MAX_RETRIES {
                retry_count += 1;
                let hint = if code == 429 { parse_retry_after(&text) } else { None };
                tracing::debug!(status = code, retry = retry_count, "retrying reasoning service call");
                wait_before_retry(retry_count, hint).await;
                continue;
            }

            let message = match code {
                401 => "invalid API key".to_string(),
                429 => format!("rate limited after {} retries", retry_count),
                500..=599 => "the service may be temporarily unavailable".to_string(),
                _ => sanitize_excerpt(&text),
            };
            return Err(LlmError::Api { status: code, message });
        }
    }
}

#[async_trait]
impl ReasoningService for OpenRouterClient {
    async fn complete(&self, prompt: &str, max_output: u32, temperature: f32) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PREAMBLE,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: max_output,
            temperature,
            stream: false,
        };

        let text = self.send_with_retry(&request).await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, sanitize_excerpt(&text))))?;

        let choice = parsed.choices.into_iter().next();
        if let Some(refusal) = choice.as_ref().and_then(|c| c.message.refusal.as_deref()) {
            return Err(LlmError::Refused(truncate_str(refusal, 200).to_string()));
        }

        let content = choice.and_then(|c| c.message.content).unwrap_or_default();
        if content.trim().is_empty() {
            return Err(LlmError::EmptyReply);
        }
        Ok(content)
    }
}

/// Extract a retry-after hint like "retry after 12 seconds" from an error body
fn parse_retry_after(text: &str) -> Option<u64> {
    let text_lower = text.to_lowercase();
    let pos = text_lower.find("retry")?;
    text_lower[pos..]
        .split_whitespace()
        .skip(1)
        .take(5)
        .filter_map(|word| word.trim_matches(|c: char| !c.is_numeric()).parse::<u64>().ok())
        .find(|secs| *secs > 0 && *secs < 300)
}

pub(crate) fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    (ms / 1000).max(1)
}

async fn wait_before_retry(retry_count: u32, hint_secs: Option<u64>) {
    let secs = hint_secs.unwrap_or_else(|| backoff_secs(retry_count));
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_network_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Network("request timed out".to_string())
    } else if err.is_connect() {
        LlmError::Network("could not connect; check your network".to_string())
    } else {
        LlmError::Network(err.to_string())
    }
}

pub(crate) fn create_http_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::Network(format!("failed to create HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_service_repeats_its_reason() {
        let service = UnavailableService::new(LlmError::MissingApiKey);
        for _ in 0..2 {
            assert!(matches!(
                service.complete("anything", 10, 0.0).await,
                Err(LlmError::MissingApiKey)
            ));
        }
    }

    struct Slow;

    #[async_trait]
    impl ReasoningService for Slow {
        async fn complete(&self, _prompt: &str, _max: u32, _t: f32) -> Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    struct Echo;

    #[async_trait]
    impl ReasoningService for Echo {
        async fn complete(&self, prompt: &str, _max: u32, _t: f32) -> Result<String, LlmError> {
            Ok(prompt.to_string())
        }
    }

    #[test]
    fn backoff_doubles_from_two_seconds() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
    }

    #[test]
    fn retry_after_hint_is_bounded() {
        assert_eq!(parse_retry_after("Rate limited, retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("retry after 900 seconds"), None);
        assert_eq!(parse_retry_after("slow down"), None);
    }

    #[tokio::test]
    async fn deadline_turns_a_slow_call_into_a_timeout() {
        let service = WithDeadline::new(Slow, Duration::from_millis(20));
        let err = service.complete("p", 10, 0.0).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(_)));
    }

    #[tokio::test]
    async fn deadline_passes_fast_replies_through() {
        let service = WithDeadline::new(Arc::new(Echo), Duration::from_secs(1));
        assert_eq!(service.complete("hello", 10, 0.0).await.unwrap(), "hello");
    }

    #[test]
    fn missing_key_is_reported() {
        let config = Config::default();
        if config.api_key().is_none() {
            assert!(matches!(OpenRouterClient::from_config(&config), Err(LlmError::MissingApiKey)));
        }
    }
}
