//! AI Integration Layer
//!
//! Provider clients behind a single dispatch entry point that adds caching,
//! rate limiting, circuit breaking, fallback routing and usage accounting.

pub mod cache;
pub mod envelope;
pub mod manager;
pub mod metrics;
pub mod prompt;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod timeout;

pub use cache::{CacheKeyStrategy, CacheStats, ResponseCache, cache_key};
pub use envelope::{Generated, RequestSpec, ResponseEnvelope, ResponseMetadata};
pub use manager::{
    AiServiceManager, AiServiceManagerBuilder, LoadBalancing, ProviderStatus, RoutingConfig,
};
pub use metrics::{Alert, AlertThresholds, SharedUsage, UsageSummary, UsageTracker};
pub use prompt::PromptBuilder;
pub use provider::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Completion,
    CompletionRequest, OfflineProvider, OpenAiProvider, ProviderClient, ProviderConfig,
    ProviderId, ProviderKind, ProviderRegistry, RateBudget, SharedClient, TokenUsage,
};
pub use rate_limit::{Admission, RateLimiter, RateUsage};
pub use retry::{RetryPolicy, with_retry, with_retry_fallback};
pub use timeout::{with_cancel, with_timeout, with_timeout_map};
