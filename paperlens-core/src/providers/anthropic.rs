//! Claude models over the Messages API.
//!
//! The key goes in `x-api-key`, every request pins `anthropic-version`,
//! system text travels in a top-level `system` field, and `max_tokens`
//! must always be sent.

use super::{build_http_client, map_transport_error, resolve_api_key};
use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Used when the request carries no explicit cap.
const DEFAULT_MAX_TOKENS: usize = 4096;

/// Provider for `llm.provider = "anthropic"`.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: Option<u64>,
    cost_input: f64,
    cost_output: f64,
}

impl AnthropicProvider {
    /// Build from config, reading the key from `llm.api_key_env`.
    ///
    /// Returns `LlmError::AuthFailed` if the key environment variable is not set.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = resolve_api_key(config)?;
        Self::new_with_key(config, api_key)
    }

    pub fn new_with_key(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: build_http_client(config)?,
            base_url,
            api_key,
            model: config.model.clone(),
            timeout_secs: config.request_timeout_secs,
            cost_input: config.input_cost_per_million / 1_000_000.0,
            cost_output: config.output_cost_per_million / 1_000_000.0,
        })
    }

    /// Build the JSON request body for the Messages API.
    fn build_request_body(&self, request: &CompletionRequest) -> Value {
        let (system_text, messages) = Self::extract_system_message(&request.messages);

        let messages_json: Vec<Value> = messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "messages": messages_json,
        });

        if let Some(system) = system_text {
            body["system"] = Value::String(system);
        }

        body
    }

    /// Split system messages out of the conversation.
    ///
    /// Multiple system messages are joined with a blank line.
    fn extract_system_message(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let (system, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);

        let system_text = if system.is_empty() {
            None
        } else {
            Some(
                system
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n"),
            )
        };

        (system_text, rest)
    }

    /// Parse a Messages API response, concatenating every text block.
    fn parse_response(body: &Value) -> Result<CompletionResponse, LlmError> {
        let model = body["model"].as_str().unwrap_or("unknown").to_string();
        let finish_reason = body["stop_reason"].as_str().map(|s| s.to_string());

        let usage = TokenUsage {
            input_tokens: body["usage"]["input_tokens"].as_u64().unwrap_or(0) as usize,
            output_tokens: body["usage"]["output_tokens"].as_u64().unwrap_or(0) as usize,
        };

        let blocks = body["content"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'content' array in response".to_string(),
            })?;

        let mut text = String::new();
        for block in blocks {
            match block["type"].as_str().unwrap_or("text") {
                "text" => text.push_str(block["text"].as_str().unwrap_or("")),
                other => debug!(block_type = other, "Ignoring non-text content block"),
            }
        }

        Ok(CompletionResponse {
            message: Message::assistant(text),
            usage,
            model,
            finish_reason,
        })
    }

    /// 429 honours `error.retry_after_secs` when the body carries it.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Anthropic".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["error"]["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                LlmError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            // 529 is Anthropic's "overloaded" status.
            code if code >= 500 => LlmError::Server {
                status: code,
                message: format!("Anthropic API: {}", body_text),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Anthropic API: {}", status, body_text),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.build_request_body(&request);
        let url = format!("{}/messages", self.base_url);

        debug!(
            model = self.model.as_str(),
            url = url.as_str(),
            "Sending Anthropic completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        Self::parse_response(&response_json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (f64, f64) {
        (self.cost_input, self.cost_output)
    }
}
