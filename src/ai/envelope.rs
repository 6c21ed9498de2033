//! Request and Response Value Types
//!
//! [`RequestSpec`] is built per call and never mutated by the dispatcher.
//! [`ResponseEnvelope`] is success XOR failure by construction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::provider::{ProviderId, TokenUsage};
use crate::constants::routing;
use crate::types::BlueprintError;

/// One AI request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// `None` lets the manager choose
    pub provider: Option<ProviderId>,
    /// `None` uses the chosen provider's default model
    pub model: Option<String>,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    /// `None` uses the provider's configured cap
    pub max_tokens: Option<u32>,
    /// Opt-in; only for deterministic prompts
    pub cacheable: bool,
    /// Overrides the derived cache key
    pub cache_key: Option<String>,
}

impl RequestSpec {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            provider: None,
            model: None,
            prompt: prompt.into(),
            system_prompt: None,
            temperature: routing::DEFAULT_TEMPERATURE,
            max_tokens: None,
            cacheable: false,
            cache_key: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cacheable = true;
        self.cache_key = Some(key.into());
        self
    }
}

/// Where and how a response was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    /// Served from the response cache
    #[serde(default)]
    pub cached: bool,
}

/// Successful dispatch result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generated {
    pub text: String,
    pub usage: TokenUsage,
    pub metadata: ResponseMetadata,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseEnvelope {
    Success(Generated),
    Failure(BlueprintError),
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn generated(&self) -> Option<&Generated> {
        match self {
            Self::Success(generated) => Some(generated),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&BlueprintError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<Generated, BlueprintError> {
        match self {
            Self::Success(generated) => Ok(generated),
            Self::Failure(err) => Err(err),
        }
    }
}

impl From<Result<Generated, BlueprintError>> for ResponseEnvelope {
    fn from(result: Result<Generated, BlueprintError>) -> Self {
        match result {
            Ok(generated) => Self::Success(generated),
            Err(err) => Self::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorCode;

    fn generated() -> Generated {
        Generated {
            text: "hello".to_string(),
            usage: TokenUsage::new(1, 2),
            metadata: ResponseMetadata {
                provider: "a".to_string(),
                model: "m".to_string(),
                latency_ms: 5,
                timestamp: Utc::now(),
                request_id: Uuid::new_v4(),
                cached: false,
            },
        }
    }

    #[test]
    fn test_envelope_accessors_are_exclusive() {
        let ok = ResponseEnvelope::Success(generated());
        assert!(ok.is_success());
        assert!(ok.error().is_none());
        assert_eq!(ok.generated().unwrap().text, "hello");

        let failed = ResponseEnvelope::Failure(BlueprintError::new(ErrorCode::InvalidResponse, "x"));
        assert!(!failed.is_success());
        assert!(failed.generated().is_none());
        assert_eq!(failed.into_result().unwrap_err().code, ErrorCode::InvalidResponse);
    }

    #[test]
    fn test_envelope_serde_is_tagged() {
        let json = serde_json::to_value(ResponseEnvelope::Success(generated())).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["text"], "hello");

        let back: ResponseEnvelope = serde_json::from_value(json).unwrap();
        assert!(back.is_success());
    }

    #[test]
    fn test_request_spec_builder() {
        let spec = RequestSpec::new("p")
            .with_model("m")
            .with_system_prompt("s")
            .with_max_tokens(10)
            .with_cache_key("k");
        assert!(spec.cacheable);
        assert_eq!(spec.cache_key.as_deref(), Some("k"));
        assert_eq!(spec.max_tokens, Some(10));
        assert!(spec.provider.is_none());
    }
}
