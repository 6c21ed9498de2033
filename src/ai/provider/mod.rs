//! LLM Provider Abstraction
//!
//! Defines the [`ProviderClient`] capability every vendor client exposes:
//! `complete(request) -> completion`. Wire formats stay inside the client.
//!
//! ## Modules
//!
//! - `circuit_breaker`: Per-provider failure gating
//! - `registry`: Typed registry handing out [`ProviderId`]s
//! - `openai`: OpenAI-compatible chat-completions client
//! - `offline`: Deterministic network-free client

mod circuit_breaker;
mod offline;
mod openai;
mod registry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use offline::{OfflineProvider, PROJECT_TAG, SECTION_TAG};
pub use openai::OpenAiProvider;
pub use registry::{ProviderId, ProviderRegistry, ProviderRegistryBuilder, RegisteredProvider};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::constants::{network, rate_limit, routing};
use crate::types::{ProviderError, Result};

// =============================================================================
// Completion Types
// =============================================================================

/// One completion call as seen by a provider client
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Token usage and cost for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Cost in USD (provider-reported, or computed from the price table)
    pub cost_usd: f64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_usd: 0.0,
        }
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }
}

/// Successful provider output
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Closed set of provider client implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions API
    #[default]
    Openai,
    /// Deterministic local generator (no network)
    Offline,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Per-provider request and token budget for one rate window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateBudget {
    pub requests_per_minute: u32,
    pub tokens_per_minute: u64,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self {
            requests_per_minute: rate_limit::REQUESTS_PER_MINUTE,
            tokens_per_minute: rate_limit::TOKENS_PER_MINUTE,
        }
    }
}

/// Configuration for one provider
///
/// API keys are never serialized and are redacted in debug output.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name used in routing config
    pub name: String,
    pub kind: ProviderKind,
    /// Supported models; the first one is the default
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Price per 1K tokens, used when the provider reports no cost
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default)]
    pub rate_limit: RateBudget,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("models", &self.models)
            .field("max_tokens", &self.max_tokens)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .field("rate_limit", &self.rate_limit)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn default_max_tokens() -> u32 {
    routing::DEFAULT_MAX_TOKENS
}

fn default_timeout_secs() -> u64 {
    network::DEFAULT_TIMEOUT_SECS
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            models: Vec::new(),
            max_tokens: default_max_tokens(),
            cost_per_1k_tokens: 0.0,
            rate_limit: RateBudget::default(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
            api_base: None,
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_rate_limit(mut self, requests_per_minute: u32, tokens_per_minute: u64) -> Self {
        self.rate_limit = RateBudget {
            requests_per_minute,
            tokens_per_minute,
        };
        self
    }

    pub fn with_cost(mut self, cost_per_1k_tokens: f64) -> Self {
        self.cost_per_1k_tokens = cost_per_1k_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// An empty model list accepts any model
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty() || self.models.iter().any(|m| m == model)
    }

    pub fn default_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cost for a call, preferring the provider-reported figure
    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        if usage.cost_usd > 0.0 {
            usage.cost_usd
        } else {
            usage.total_tokens as f64 * self.cost_per_1k_tokens / 1000.0
        }
    }
}

// =============================================================================
// Provider Client Trait
// =============================================================================

/// Uniform completion capability implemented by every vendor client
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Run one completion
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError>;

    /// Lightweight, no-cost reachability check
    async fn probe(&self) -> bool;

    /// Implementation kind, for logging
    fn kind(&self) -> ProviderKind;
}

/// Shared client type for concurrent access across generations
pub type SharedClient = Arc<dyn ProviderClient>;

/// Create a client for a configured provider
pub fn create_client(config: &ProviderConfig) -> Result<SharedClient> {
    match config.kind {
        ProviderKind::Openai => Ok(Arc::new(OpenAiProvider::new(config)?)),
        ProviderKind::Offline => Ok(Arc::new(OfflineProvider::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_model() {
        let config = ProviderConfig::new("a", ProviderKind::Offline).with_models(&["m1", "m2"]);
        assert!(config.supports_model("m1"));
        assert!(!config.supports_model("m3"));
        assert_eq!(config.default_model(), Some("m1"));

        let open = ProviderConfig::new("b", ProviderKind::Offline);
        assert!(open.supports_model("anything"));
        assert_eq!(open.default_model(), None);
    }

    #[test]
    fn test_cost_prefers_reported() {
        let config = ProviderConfig::new("a", ProviderKind::Offline).with_cost(2.0);
        let reported = TokenUsage::new(100, 400).with_cost(0.5);
        assert!((config.cost_for(&reported) - 0.5).abs() < f64::EPSILON);

        let computed = TokenUsage::new(100, 400);
        assert!((config.cost_for(&computed) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let mut config = ProviderConfig::new("a", ProviderKind::Openai);
        config.api_key = Some("sk-secret".to_string());
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = ProviderConfig::new("a", ProviderKind::Openai);
        config.api_key = Some("sk-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }

    #[test]
    fn test_kind_deserializes_snake_case() {
        let kind: ProviderKind = serde_json::from_str("\"offline\"").unwrap();
        assert_eq!(kind, ProviderKind::Offline);
        assert!(serde_json::from_str::<ProviderKind>("\"mystery\"").is_err());
    }
}
