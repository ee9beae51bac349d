//! Chat-completions backend: OpenAI itself and any server that mimics its
//! `/chat/completions` route.

use super::{build_http_client, map_transport_error, resolve_api_key};
use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, Message, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default provider; `llm.base_url` points it at other compatible servers.
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: Option<u64>,
    cost_input: f64,
    cost_output: f64,
}

impl OpenAiCompatibleProvider {
    /// Create a new provider from configuration.
    ///
    /// Reads the API key from the environment variable named in `config.api_key_env`.
    /// Local endpoints (localhost / 127.0.0.1) work without a key.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = match resolve_api_key(config) {
            Ok(key) => key,
            Err(_) if Self::is_local(config) => {
                debug!("No API key set for local provider; using dummy bearer token");
                "ollama".to_string()
            }
            Err(e) => return Err(e),
        };
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

    fn is_local(config: &LlmConfig) -> bool {
        config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false)
    }

    fn messages_to_json(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| {
                json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            })
            .collect()
    }

    /// Build the request body for `/chat/completions`.
    fn request_body(&self, request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": Self::messages_to_json(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    /// Parse the first choice of a chat completion response.
    fn parse_response(json: &Value, model: &str) -> Result<CompletionResponse, LlmError> {
        let choice = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;

        let message = choice.get("message").ok_or_else(|| LlmError::ResponseParse {
            message: "No message in choice".to_string(),
        })?;

        // A null content (e.g. a refusal) is treated as an empty answer.
        let text = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or_default();

        let finish_reason = choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(|s| s.to_string());

        let usage = json
            .get("usage")
            .map(|u| TokenUsage {
                input_tokens: u
                    .get("prompt_tokens")
                    .and_then(|t| t.as_u64())
                    .unwrap_or(0) as usize,
                output_tokens: u
                    .get("completion_tokens")
                    .and_then(|t| t.as_u64())
                    .unwrap_or(0) as usize,
            })
            .unwrap_or_default();

        let model_name = json
            .get("model")
            .and_then(|m| m.as_str())
            .unwrap_or(model)
            .to_string();

        Ok(CompletionResponse {
            message: Message::assistant(text),
            usage,
            model: model_name,
            finish_reason,
        })
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed ({})", status);
                LlmError::AuthFailed {
                    provider: "OpenAI-compatible".to_string(),
                }
            }
            429 => {
                // "Rate limit reached ... Please try again in 20s."
                let retry_secs = serde_json::from_str::<Value>(body)
                    .ok()
                    .and_then(|v| {
                        v.get("error")?
                            .get("message")?
                            .as_str()
                            .map(|s| s.to_string())
                    })
                    .and_then(|msg| {
                        msg.split("in ").last().and_then(|s| {
                            s.trim_end_matches('.')
                                .trim_end_matches('s')
                                .parse::<f64>()
                                .ok()
                        })
                    })
                    .map(|secs| secs.ceil() as u64)
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            code if code >= 500 => LlmError::Server {
                status: code,
                message: body.to_string(),
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(url = %url, model = %self.model, "Sending OpenAI completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;

        Self::parse_response(&json, &self.model)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn cost_per_token(&self) -> (f64, f64) {
        (self.cost_input, self.cost_output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LlmConfig {
        LlmConfig {
            provider: "openai".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key_env: "PAPERLENS_TEST_OPENAI_COMPAT_KEY".to_string(),
            input_cost_per_million: 0.40,
            output_cost_per_million: 1.60,
            ..Default::default()
        }
    }

    #[test]
    fn test_messages_to_json_text() {
        let messages = vec![
            Message::system("You are a research assistant"),
            Message::user("Summarize this"),
            Message::assistant("Done"),
        ];
        let json = OpenAiCompatibleProvider::messages_to_json(&messages);
        assert_eq!(json.len(), 3);
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[0]["content"], "You are a research assistant");
        assert_eq!(json[1]["role"], "user");
        assert_eq!(json[2]["role"], "assistant");
    }

    #[test]
    fn test_request_body_carries_temperature_and_cap() {
        let provider =
            OpenAiCompatibleProvider::new_with_key(&test_config(), "sk-test".into()).unwrap();
        let mut request = CompletionRequest::single_prompt("hello", 0.3);
        request.max_tokens = Some(512);
        let body = provider.request_body(&request);
        assert_eq!(body["model"], "gpt-4.1-mini");
        assert!((body["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_request_body_omits_unset_cap() {
        let provider =
            OpenAiCompatibleProvider::new_with_key(&test_config(), "sk-test".into()).unwrap();
        let body = provider.request_body(&CompletionRequest::single_prompt("hello", 0.3));
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_text_response() {
        let body = json!({
            "id": "chatcmpl-123",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "{\"year\": \"2021\"}"
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 8,
                "total_tokens": 18
            },
            "model": "gpt-4.1-mini"
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body, "gpt-4.1-mini").unwrap();
        assert_eq!(resp.text(), "{\"year\": \"2021\"}");
        assert_eq!(resp.usage.input_tokens, 10);
        assert_eq!(resp.usage.output_tokens, 8);
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.model, "gpt-4.1-mini");
    }

    #[test]
    fn test_parse_null_content_is_empty() {
        let body = json!({
            "choices": [{ "message": { "role": "assistant", "content": null } }]
        });
        let resp = OpenAiCompatibleProvider::parse_response(&body, "m").unwrap();
        assert_eq!(resp.text(), "");
        assert_eq!(resp.usage, TokenUsage::default());
    }

    #[test]
    fn test_parse_response_no_choices() {
        let body = json!({"choices": []});
        let result = OpenAiCompatibleProvider::parse_response(&body, "gpt-4.1-mini");
        assert!(matches!(result, Err(LlmError::ResponseParse { .. })));
    }

    #[test]
    fn test_http_error_mapping_401() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::UNAUTHORIZED,
            "Unauthorized",
        );
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn test_http_error_mapping_429_reads_delay() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached. Please try again in 20s"}}"#,
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 20),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping_429_default_delay() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            "slow down",
        );
        match err {
            LlmError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 5),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_mapping_5xx_is_server_error() {
        let err = OpenAiCompatibleProvider::map_http_error(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "upstream overloaded",
        );
        match err {
            LlmError::Server { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream overloaded");
            }
            other => panic!("Expected Server, got {:?}", other),
        }
    }

    #[test]
    fn test_new_reads_env() {
        // SAFETY: test-only env var manipulation
        unsafe { std::env::set_var("PAPERLENS_TEST_OPENAI_COMPAT_KEY", "sk-test-key") };
        let provider = OpenAiCompatibleProvider::new(&test_config()).unwrap();
        assert_eq!(provider.model_name(), "gpt-4.1-mini");
        let (input, output) = provider.cost_per_token();
        assert!((input - 0.40 / 1_000_000.0).abs() < 1e-12);
        assert!((output - 1.60 / 1_000_000.0).abs() < 1e-12);
        // SAFETY: test-only env var manipulation
        unsafe { std::env::remove_var("PAPERLENS_TEST_OPENAI_COMPAT_KEY") };
    }

    #[test]
    fn test_new_missing_key() {
        let mut config = test_config();
        config.api_key_env = "PAPERLENS_TEST_OPENAI_COMPAT_MISSING".to_string();
        let result = OpenAiCompatibleProvider::new(&config);
        assert!(matches!(result, Err(LlmError::AuthFailed { .. })));
    }

    #[test]
    fn test_local_endpoint_needs_no_key() {
        let mut config = test_config();
        config.api_key_env = "PAPERLENS_TEST_OPENAI_COMPAT_LOCAL_MISSING".to_string();
        config.base_url = Some("http://localhost:11434/v1/".to_string());
        let provider = OpenAiCompatibleProvider::new(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert_eq!(provider.api_key, "ollama");
    }
}
