//! HTTP model backends plus the retry policy shared by every call.
//!
//! Two wire formats are supported: OpenAI-style `/chat/completions`
//! (which also covers Ollama, vLLM and other local servers) and the
//! Anthropic Messages API.

pub mod anthropic;
pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::{LlmConfig, RetryConfig};
use crate::error::LlmError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatibleProvider;

/// Run one model call, repeating it while it fails transiently.
///
/// A summary or a single comparison cell maps to exactly one `operation`;
/// at most `max_retries` extra attempts follow the first. Rate limits,
/// dropped connections, timeouts and 5xx answers are transient. Anything
/// else, including an answer the caller later fails to parse, is returned
/// on the first attempt.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_transient(&err) && attempt < config.max_retries => {
                let delay_ms = retry_delay_ms(config, attempt, &err);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    delay_ms,
                    error = %err,
                    "Model call failed transiently, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. }
            | LlmError::Server { .. }
            | LlmError::Connection { .. }
            | LlmError::Timeout { .. }
    )
}

/// Delay before the next attempt; a rate-limit hint is a lower bound.
fn retry_delay_ms(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let backoff = backoff_delay_ms(config, attempt);
    match err {
        LlmError::RateLimited { retry_after_secs } => backoff.max(retry_after_secs * 1000),
        _ => backoff,
    }
}

/// `initial * multiplier^attempt`, capped at `max_backoff_ms`, plus up to 25% jitter.
fn backoff_delay_ms(config: &RetryConfig, attempt: u32) -> u64 {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay = (config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(exponent))
        .min(config.max_backoff_ms as f64) as u64;
    if !config.jitter {
        return delay;
    }
    delay + (delay as f64 * 0.25 * jitter_fraction()) as u64
}

/// Fraction in [0, 1) taken from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or_default();
    f64::from(nanos % 1000) / 1000.0
}

/// Resolve the API key for a provider from the environment variable named in config.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String, LlmError> {
    std::env::var(&config.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| LlmError::AuthFailed {
            provider: format!("{} (env var '{}' not set)", config.provider, config.api_key_env),
        })
}

/// Build the shared HTTP client, applying the optional per-request timeout.
pub(crate) fn build_http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = config.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().map_err(|e| LlmError::Connection {
        message: format!("Failed to build HTTP client: {}", e),
    })
}

/// Map a transport-level reqwest failure onto the retry taxonomy.
pub(crate) fn map_transport_error(err: reqwest::Error, timeout_secs: Option<u64>) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout {
            timeout_secs: timeout_secs.unwrap_or_default(),
        }
    } else if err.is_connect() {
        LlmError::Connection {
            message: err.to_string(),
        }
    } else {
        LlmError::ApiRequest {
            message: format!("Request failed: {}", err),
        }
    }
}

/// Pick the backend named by `llm.provider`; anything but `"anthropic"`
/// speaks the OpenAI chat format.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        _ => Ok(Arc::new(OpenAiCompatibleProvider::new(config)?)),
    }
}
