//! Model access: the provider trait, the retrying `Brain`, and a test double.
//!
//! Defines the `LlmProvider` trait for model-agnostic, single-turn completions,
//! the `Brain` wrapper that applies retry and tracks usage for a whole run,
//! and a scriptable `MockLlmProvider` for tests.

use crate::config::RetryConfig;
use crate::error::LlmError;
use crate::providers::with_retry;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Trait for LLM providers. Paperlens only needs non-streaming completions.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;

    /// Return the cost per token (input, output) in USD.
    fn cost_per_token(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Running totals for every model call made through a [`Brain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CallStats {
    /// Calls that eventually succeeded or failed (retries are not counted separately).
    pub calls: usize,
    /// Calls that failed after exhausting retries.
    pub failures: usize,
    pub usage: TokenUsage,
    /// Estimated cost in USD from the provider's per-token rates.
    pub cost_usd: f64,
}

/// Thin wrapper around a provider that applies retry and accumulates usage.
pub struct Brain {
    provider: Arc<dyn LlmProvider>,
    retry: RetryConfig,
    max_tokens: Option<usize>,
    stats: Mutex<CallStats>,
}

impl Brain {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryConfig) -> Self {
        Self {
            provider,
            retry,
            max_tokens: None,
            stats: Mutex::new(CallStats::default()),
        }
    }

    /// Cap the number of tokens the model may generate per call.
    pub fn with_max_tokens(mut self, max_tokens: Option<usize>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send one prompt and return the trimmed response text.
    ///
    /// Transient failures are retried according to the configured policy;
    /// the returned error is the last one observed.
    pub async fn complete_text(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        let mut request = CompletionRequest::single_prompt(prompt, temperature);
        request.max_tokens = self.max_tokens;

        debug!(
            model = %self.provider.model_name(),
            prompt_chars = prompt.len(),
            temperature,
            "Sending completion request"
        );

        let result = with_retry(&self.retry, || self.provider.complete(request.clone())).await;

        let mut stats = self.lock_stats();
        stats.calls += 1;
        match result {
            Ok(response) => {
                stats.usage.accumulate(&response.usage);
                let (input_rate, output_rate) = self.provider.cost_per_token();
                stats.cost_usd += response.usage.input_tokens as f64 * input_rate
                    + response.usage.output_tokens as f64 * output_rate;
                Ok(response.text().trim().to_string())
            }
            Err(e) => {
                stats.failures += 1;
                warn!(error = %e, "Model call failed");
                Err(e)
            }
        }
    }

    /// Snapshot of the usage accumulated so far.
    pub fn stats(&self) -> CallStats {
        *self.lock_stats()
    }

    /// Get the model name.
    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    fn lock_stats(&self) -> MutexGuard<'_, CallStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Response generator used by [`MockLlmProvider::with_handler`].
type MockHandler = Box<dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync>;

/// A mock LLM provider for testing.
///
/// Responses are served from a FIFO queue first, then from an optional
/// handler, then from a fixed fallback text. Every request is recorded.
pub struct MockLlmProvider {
    model: String,
    fallback: String,
    responses: Mutex<VecDeque<Result<CompletionResponse, LlmError>>>,
    handler: Option<MockHandler>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            fallback: "I'm a mock LLM. No queued responses available.".to_string(),
            responses: Mutex::new(VecDeque::new()),
            handler: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a MockLlmProvider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: text.to_string(),
            ..Self::new()
        }
    }

    /// Create a MockLlmProvider that answers every request with `handler`.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new()
        }
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: CompletionResponse) {
        lock(&self.responses).push_back(Ok(response));
    }

    /// Queue a plain text response.
    pub fn queue_text(&self, text: &str) {
        self.queue_response(Self::text_response(text));
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            message: Message::assistant(text),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Number of `complete` calls received so far.
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        lock(&self.requests).push(request.clone());

        if let Some(queued) = lock(&self.responses).pop_front() {
            return queued;
        }
        match &self.handler {
            Some(handler) => handler(&request).map(|text| Self::text_response(&text)),
            None => Ok(Self::text_response(&self.fallback)),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_mock_serves_queue_in_order() {
        let mock = MockLlmProvider::new();
        mock.queue_text("first");
        mock.queue_text("second");

        let a = mock.complete(CompletionRequest::default()).await.unwrap();
        let b = mock.complete(CompletionRequest::default()).await.unwrap();
        let c = mock.complete(CompletionRequest::default()).await.unwrap();
        assert_eq!(a.text(), "first");
        assert_eq!(b.text(), "second");
        assert!(c.text().contains("mock LLM"));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_handler_sees_prompt() {
        let mock = MockLlmProvider::with_handler(|req| Ok(format!("echo: {}", req.prompt_text())));
        let resp = mock
            .complete(CompletionRequest::single_prompt("ping", 0.0))
            .await
            .unwrap();
        assert_eq!(resp.text(), "echo: ping");
    }

    #[tokio::test]
    async fn test_brain_trims_and_tracks_usage() {
        let mock = Arc::new(MockLlmProvider::with_response("  answer \n"));
        let brain = Brain::new(mock.clone(), no_retry());

        let text = brain.complete_text("question", 0.3).await.unwrap();
        assert_eq!(text, "answer");

        let stats = brain.stats();
        assert_eq!(stats.calls, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.usage.input_tokens, 100);
        assert_eq!(stats.usage.output_tokens, 50);

        let sent = &mock.requests()[0];
        assert_eq!(sent.temperature, 0.3);
        assert_eq!(sent.prompt_text(), "question");
    }

    #[tokio::test]
    async fn test_brain_counts_failures() {
        let mock = Arc::new(MockLlmProvider::new());
        mock.queue_error(LlmError::ApiRequest {
            message: "boom".into(),
        });
        let brain = Brain::new(mock, no_retry());

        let result = brain.complete_text("question", 0.3).await;
        assert!(result.is_err());
        assert_eq!(brain.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_brain_passes_max_tokens() {
        let mock = Arc::new(MockLlmProvider::new());
        let brain = Brain::new(mock.clone(), no_retry()).with_max_tokens(Some(256));
        brain.complete_text("q", 0.0).await.unwrap();
        assert_eq!(mock.requests()[0].max_tokens, Some(256));
    }
}
