//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/blueprint-forge/) and project (.blueprint-forge/)
//! level configuration.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ai::cache::CacheKeyStrategy;
use crate::ai::manager::RoutingConfig;
use crate::ai::metrics::AlertThresholds;
use crate::ai::provider::{CircuitBreakerConfig, ProviderConfig, ProviderKind};
use crate::ai::retry::RetryPolicy;
use crate::blueprint::ValidationConfig;
use crate::constants::{cache, progress, rate_limit, routing};
use crate::types::{ForgeError, Result};

/// Model used by the default provider entry
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Providers in registration (priority) order
    pub providers: Vec<ProviderConfig>,

    pub routing: RoutingConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    pub rate_limit: RateLimitConfig,

    pub cache: CacheConfig,

    pub retry: RetryPolicy,

    pub alerts: AlertThresholds,

    pub progress: ProgressConfig,

    pub generation: GenerationConfig,

    pub validation: ValidationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            providers: vec![
                ProviderConfig::new("openai", ProviderKind::Openai)
                    .with_models(&[DEFAULT_OPENAI_MODEL])
                    .with_cost(0.0006),
            ],
            routing: RoutingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryPolicy::default(),
            alerts: AlertThresholds::default(),
            progress: ProgressConfig::default(),
            generation: GenerationConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Config {
    /// Replace every provider with a single network-free one
    pub fn into_offline(mut self) -> Self {
        self.providers = vec![ProviderConfig::new("offline", ProviderKind::Offline)];
        self.routing.fallback_chain.clear();
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(ForgeError::Config(
                "At least one provider must be configured".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            let name = provider.name.trim();
            if name.is_empty() {
                return Err(ForgeError::Config(
                    "Provider name must not be empty".to_string(),
                ));
            }
            if !names.insert(name) {
                return Err(ForgeError::Config(format!(
                    "Duplicate provider name '{}'",
                    name
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ForgeError::Config(format!(
                    "Provider '{}' timeout_secs must be greater than 0",
                    name
                )));
            }
            if provider.max_tokens == 0 {
                return Err(ForgeError::Config(format!(
                    "Provider '{}' max_tokens must be greater than 0",
                    name
                )));
            }
            if provider.rate_limit.requests_per_minute == 0
                || provider.rate_limit.tokens_per_minute == 0
            {
                return Err(ForgeError::Config(format!(
                    "Provider '{}' rate limit budgets must be greater than 0",
                    name
                )));
            }
            if provider.rate_limit.tokens_per_minute < u64::from(provider.max_tokens) {
                return Err(ForgeError::Config(format!(
                    "Provider '{}' rate_limit.tokens_per_minute ({}) is below max_tokens ({}); no request could be admitted",
                    name, provider.rate_limit.tokens_per_minute, provider.max_tokens
                )));
            }
            if !provider.cost_per_1k_tokens.is_finite() || provider.cost_per_1k_tokens < 0.0 {
                return Err(ForgeError::Config(format!(
                    "Provider '{}' cost_per_1k_tokens must be a non-negative number",
                    name
                )));
            }
            if let Some(base) = &provider.api_base {
                url::Url::parse(base).map_err(|e| {
                    ForgeError::Config(format!(
                        "Provider '{}' api_base '{}' is not a valid URL: {}",
                        name, base, e
                    ))
                })?;
            }
        }

        for name in &self.routing.fallback_chain {
            if !names.contains(name.trim()) {
                return Err(ForgeError::UnknownProvider(name.clone()));
            }
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ForgeError::Config(format!(
                "Generation temperature must be between 0.0 and 2.0, got {}",
                self.generation.temperature
            )));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ForgeError::Config(
                "circuit_breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }

        if self.rate_limit.window_secs == 0 {
            return Err(ForgeError::Config(
                "rate_limit.window_secs must be greater than 0".to_string(),
            ));
        }

        if self.cache.enabled
            && (self.cache.max_entries == 0
                || self.cache.ttl_secs == 0
                || self.cache.purge_interval_secs == 0)
        {
            return Err(ForgeError::Config(
                "cache.max_entries, cache.ttl_secs and cache.purge_interval_secs must be greater than 0 when enabled"
                    .to_string(),
            ));
        }

        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(ForgeError::Config(format!(
                "retry.max_delay_ms ({}) must be at least retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }

        if !(0.0..=1.0).contains(&self.alerts.max_error_rate) {
            return Err(ForgeError::Config(format!(
                "alerts.max_error_rate must be between 0.0 and 1.0, got {}",
                self.alerts.max_error_rate
            )));
        }

        if self.progress.sweep_interval_secs == 0 || self.progress.max_age_secs == 0 {
            return Err(ForgeError::Config(
                "progress.max_age_secs and progress.sweep_interval_secs must be greater than 0"
                    .to_string(),
            ));
        }

        if self.validation.min_section_chars >= self.validation.max_section_chars {
            return Err(ForgeError::Config(format!(
                "validation.min_section_chars ({}) must be below max_section_chars ({})",
                self.validation.min_section_chars, self.validation.max_section_chars
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Section Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Length of one accounting window
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: rate_limit::WINDOW_SECS,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub key_strategy: CacheKeyStrategy,
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: cache::TTL_SECS,
            max_entries: cache::MAX_ENTRIES,
            key_strategy: CacheKeyStrategy::default(),
            purge_interval_secs: cache::PURGE_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Idle entries older than this are swept
    pub max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            max_age_secs: progress::MAX_AGE_SECS,
            sweep_interval_secs: progress::SWEEP_INTERVAL_SECS,
        }
    }
}

impl ProgressConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Per-section request settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    /// Marks first-generation section requests cacheable when the cache is on
    pub cache_sections: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: routing::DEFAULT_TEMPERATURE,
            cache_sections: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].default_model(), Some(DEFAULT_OPENAI_MODEL));
    }

    #[test]
    fn test_into_offline() {
        let mut config = Config::default();
        config.routing.fallback_chain = vec!["openai".to_string()];
        let offline = config.into_offline();
        assert_eq!(offline.providers[0].kind, ProviderKind::Offline);
        offline.validate().unwrap();
    }

    #[test]
    fn test_rejects_duplicate_providers() {
        let mut config = Config::default().into_offline();
        config
            .providers
            .push(ProviderConfig::new("offline", ProviderKind::Offline));
        assert!(matches!(config.validate(), Err(ForgeError::Config(_))));
    }

    #[test]
    fn test_rejects_unknown_fallback_name() {
        let mut config = Config::default();
        config.routing.fallback_chain = vec!["ghost".to_string()];
        assert!(matches!(
            config.validate(),
            Err(ForgeError::UnknownProvider(name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.generation.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers[0].rate_limit.requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers[0].api_base = Some("not a url".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.validation.min_section_chars = config.validation.max_section_chars;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_token_budget_below_max_tokens() {
        let mut config = Config::default().into_offline();
        config.providers[0].rate_limit.tokens_per_minute = 2_000;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("tokens_per_minute"));

        config.providers[0].max_tokens = 2_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_key_never_serialized() {
        let mut config = Config::default();
        config.providers[0].api_key = Some("sk-secret".to_string());
        let rendered = toml::to_string_pretty(&config).unwrap();
        assert!(!rendered.contains("sk-secret"));
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }
}
