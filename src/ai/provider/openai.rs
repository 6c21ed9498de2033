//! OpenAI API Provider
//!
//! Chat Completions client for OpenAI and API-compatible gateways.
//! Errors are reported structurally so the classifier can use the HTTP
//! status instead of guessing from text.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Completion, CompletionRequest, ProviderClient, ProviderConfig, ProviderKind, TokenUsage};
use crate::types::{ForgeError, ProviderError, Result};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// OpenAI API Provider with secure API key handling
pub struct OpenAiProvider {
    /// Never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ForgeError::Config(format!(
                    "API key for provider '{}' not found. Set {} or providers.api_key",
                    config.name, API_KEY_ENV
                ))
            })?;

        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        url::Url::parse(&api_base)
            .map_err(|e| ForgeError::Config(format!("Invalid api_base '{}': {}", api_base, e)))?;

        // Per-call deadlines are enforced by the dispatcher; this is a backstop
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ForgeError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: SecretString::from(api_key),
            api_base,
            timeout: config.timeout(),
            client,
        })
    }

    fn build_request<'a>(request: &'a CompletionRequest) -> ChatCompletionRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        ChatCompletionRequest {
            model: &request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }

    fn map_transport(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model = %request.model, "Sending chat completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&Self::build_request(request))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: extract_error_message(&body),
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("malformed body: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no content in response".to_string()))?;

        // The API does not report cost; the dispatcher prices from config
        let usage = body
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }

    async fn probe(&self) -> bool {
        let url = format!("{}/models", self.api_base);

        match self
            .client
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "OpenAI probe failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "OpenAI probe failed");
                false
            }
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }
}

/// Pull `error.message` out of an API error body, falling back to the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .unwrap_or_else(|| body.chars().take(500).collect())
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> ProviderConfig {
        let mut config = ProviderConfig::new("openai", ProviderKind::Openai);
        config.api_key = Some("sk-test".to_string());
        config
    }

    #[test]
    fn test_request_includes_system_prompt_first() {
        let request = CompletionRequest {
            model: "gpt-4o".to_string(),
            prompt: "hello".to_string(),
            system_prompt: Some("be brief".to_string()),
            temperature: 0.2,
            max_tokens: 128,
        };
        let json = serde_json::to_value(OpenAiProvider::build_request(&request)).unwrap();

        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hello");
        assert_eq!(json["max_tokens"], 128);
    }

    #[test]
    fn test_request_without_system_prompt() {
        let request = CompletionRequest {
            model: "m".to_string(),
            prompt: "p".to_string(),
            system_prompt: None,
            temperature: 0.0,
            max_tokens: 1,
        };
        let json = serde_json::to_value(OpenAiProvider::build_request(&request)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        assert_eq!(extract_error_message(body), "Rate limit reached");
        assert_eq!(extract_error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_new_trims_api_base_and_redacts_debug() {
        let mut config = config_with_key();
        config.api_base = Some("http://localhost:8080/v1/".to_string());
        let provider = OpenAiProvider::new(&config).unwrap();

        assert_eq!(provider.api_base, "http://localhost:8080/v1");
        let debug = format!("{:?}", provider);
        assert!(!debug.contains("sk-test"));
    }

    #[test]
    fn test_invalid_api_base_rejected() {
        let mut config = config_with_key();
        config.api_base = Some("not a url".to_string());
        assert!(matches!(
            OpenAiProvider::new(&config),
            Err(ForgeError::Config(_))
        ));
    }
}
