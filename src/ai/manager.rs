//! AI Service Manager
//!
//! Single entry point for "make one AI request". Wraps every provider client
//! with the response cache, rate limiter and circuit breaker, picks a provider
//! by load-balancing strategy and walks the fallback chain on failure.
//!
//! ## Per-candidate pipeline
//!
//! ```text
//! cache lookup -> rate limiter -> circuit breaker -> provider call (timeout, cancel)
//!      |               |                |                   |
//!    hit: done    deny: next       open: next        fail: classify, next
//! ```
//!
//! Ordinary failures come back as [`ResponseEnvelope::Failure`]. Only
//! programmer errors (a handle from a different registry) are `Err`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::ai::cache::{CacheKeyStrategy, ResponseCache, cache_key};
use crate::ai::envelope::{Generated, RequestSpec, ResponseEnvelope, ResponseMetadata};
use crate::ai::metrics::UsageTracker;
use crate::ai::provider::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, CompletionRequest, ProviderId,
    ProviderRegistry, RegisteredProvider, TokenUsage,
};
use crate::ai::rate_limit::{Admission, RateLimiter};
use crate::ai::timeout::{with_cancel, with_timeout, with_timeout_map};
use crate::constants::{network, rate_limit as rl_constants};
use crate::types::{
    BlueprintError, ErrorClassifier, ErrorCode, ForgeError, Result, estimate_tokens,
};

/// Model name sent when neither the request nor the provider names one
const FALLBACK_MODEL: &str = "default";

// =============================================================================
// Routing Configuration
// =============================================================================

/// How the primary provider is chosen when a request does not name one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancing {
    /// Rotate across eligible providers
    #[default]
    RoundRobin,
    /// First eligible provider in registration order
    Priority,
    /// Eligible provider with the lowest price per token
    LeastCost,
}

impl std::fmt::Display for LoadBalancing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round_robin"),
            Self::Priority => write!(f, "priority"),
            Self::LeastCost => write!(f, "least_cost"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: LoadBalancing,
    /// Provider names tried in order after the primary fails.
    /// Empty means every provider in registration order.
    pub fallback_chain: Vec<String>,
}

/// Observability snapshot for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub available: bool,
    pub rate_limited: bool,
    pub circuit_breaker_open: bool,
    pub circuit_state: CircuitState,
}

// =============================================================================
// Manager
// =============================================================================

pub struct AiServiceManager {
    registry: Arc<ProviderRegistry>,
    strategy: LoadBalancing,
    fallback_chain: Vec<ProviderId>,
    breakers: DashMap<ProviderId, Arc<CircuitBreaker>>,
    limiter: RateLimiter,
    cache: Option<Arc<ResponseCache>>,
    key_strategy: CacheKeyStrategy,
    usage: Arc<UsageTracker>,
    cursor: AtomicUsize,
}

impl AiServiceManager {
    pub fn builder(registry: Arc<ProviderRegistry>) -> AiServiceManagerBuilder {
        AiServiceManagerBuilder::new(registry)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn cache(&self) -> Option<&Arc<ResponseCache>> {
        self.cache.as_ref()
    }

    pub fn circuit_breaker(&self, id: &ProviderId) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(id).map(|b| Arc::clone(b.value()))
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Dispatch without a cancellation signal
    pub async fn dispatch(&self, spec: RequestSpec) -> Result<ResponseEnvelope> {
        self.dispatch_with_cancel(spec, &CancellationToken::new()).await
    }

    #[instrument(skip_all, fields(request_id = tracing::field::Empty))]
    pub async fn dispatch_with_cancel(
        &self,
        spec: RequestSpec,
        cancel: &CancellationToken,
    ) -> Result<ResponseEnvelope> {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        if let Some(id) = &spec.provider
            && self.registry.get(id).is_none()
        {
            return Err(ForgeError::UnknownProvider(id.name().to_string()));
        }

        let candidates = self.candidates(&spec);
        if candidates.is_empty() {
            let model = spec.model.as_deref().unwrap_or(FALLBACK_MODEL);
            warn!(model, "No configured provider supports the requested model");
            return Ok(ResponseEnvelope::Failure(BlueprintError::new(
                ErrorCode::AiServiceUnavailable,
                format!("no configured provider supports model '{}'", model),
            )));
        }

        let mut last_error: Option<BlueprintError> = None;
        for (attempt, provider) in candidates.iter().enumerate() {
            if attempt > 0 {
                debug!(provider = %provider.id, attempt, "Trying fallback provider");
            }
            match self.attempt(provider, &spec, request_id, cancel).await {
                Ok(generated) => return Ok(ResponseEnvelope::Success(generated)),
                Err(err) if err.code == ErrorCode::Cancelled => {
                    return Ok(ResponseEnvelope::Failure(err));
                }
                Err(err) => {
                    debug!(provider = %provider.id, code = %err.code, "Provider attempt failed");
                    last_error = Some(err);
                }
            }
        }

        let err = last_error.unwrap_or_else(|| {
            BlueprintError::new(ErrorCode::GenerationFailed, "fallback chain exhausted")
        });
        warn!(
            code = %err.code,
            error = %err.message,
            tried = candidates.len(),
            "All providers in the fallback chain failed"
        );
        Ok(ResponseEnvelope::Failure(err))
    }

    /// Ordered providers to try for this request
    fn candidates(&self, spec: &RequestSpec) -> Vec<&RegisteredProvider> {
        let supports = |p: &RegisteredProvider| match spec.model.as_deref() {
            Some(model) => p.config.supports_model(model),
            None => true,
        };

        let primary = match &spec.provider {
            Some(id) => self.registry.get(id),
            None => self.select_primary(&supports),
        };

        let mut ordered: Vec<&RegisteredProvider> = Vec::new();
        if let Some(primary) = primary.filter(|p| supports(*p)) {
            ordered.push(primary);
        }
        for id in &self.fallback_chain {
            if let Some(p) = self.registry.get(id)
                && supports(p)
                && !ordered.iter().any(|o| o.id == p.id)
            {
                ordered.push(p);
            }
        }
        ordered
    }

    /// Load balancing over providers that are not circuit-OPEN
    fn select_primary(
        &self,
        supports: &dyn Fn(&RegisteredProvider) -> bool,
    ) -> Option<&RegisteredProvider> {
        let eligible: Vec<&RegisteredProvider> = self
            .registry
            .iter()
            .filter(|p| supports(*p))
            .filter(|p| {
                self.circuit_breaker(&p.id)
                    .is_none_or(|b| b.state() != CircuitState::Open)
            })
            .collect();

        if eligible.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancing::RoundRobin => {
                let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
                eligible.get(turn % eligible.len()).copied()
            }
            LoadBalancing::Priority => eligible.first().copied(),
            LoadBalancing::LeastCost => eligible
                .into_iter()
                .min_by(|a, b| a.config.cost_per_1k_tokens.total_cmp(&b.config.cost_per_1k_tokens)),
        }
    }

    /// Run the cache -> limiter -> breaker -> call pipeline against one provider
    async fn attempt(
        &self,
        provider: &RegisteredProvider,
        spec: &RequestSpec,
        request_id: Uuid,
        cancel: &CancellationToken,
    ) -> std::result::Result<Generated, BlueprintError> {
        let name = provider.id.name();
        let model = spec
            .model
            .as_deref()
            .or(provider.config.default_model())
            .unwrap_or(FALLBACK_MODEL)
            .to_string();

        let key = self.cache.as_ref().filter(|_| spec.cacheable).map(|_| {
            spec.cache_key.clone().unwrap_or_else(|| {
                cache_key(
                    self.key_strategy,
                    name,
                    &model,
                    &spec.prompt,
                    spec.system_prompt.as_deref(),
                    spec.temperature,
                )
            })
        });

        if let (Some(cache), Some(key)) = (&self.cache, &key)
            && let Some(ResponseEnvelope::Success(hit)) = cache.get(key)
        {
            debug!(provider = name, "Response cache hit");
            self.usage.record_cache_hit(name);
            return Ok(Generated {
                text: hit.text,
                usage: TokenUsage {
                    cost_usd: 0.0,
                    ..hit.usage
                },
                metadata: ResponseMetadata {
                    provider: hit.metadata.provider,
                    model: hit.metadata.model,
                    latency_ms: 0,
                    timestamp: Utc::now(),
                    request_id,
                    cached: true,
                },
            });
        }

        let max_tokens = spec.max_tokens.unwrap_or(provider.config.max_tokens);
        let estimated = estimate_tokens(&spec.prompt)
            + spec.system_prompt.as_deref().map(estimate_tokens).unwrap_or(0)
            + u64::from(max_tokens);

        match self.limiter.admit(&provider.id, estimated) {
            Admission::Admitted => {}
            Admission::Oversized => {
                return Err(BlueprintError::exceeds_rate_window(
                    name,
                    estimated,
                    provider.config.rate_limit.tokens_per_minute,
                ));
            }
            Admission::Exhausted | Admission::Unregistered => {
                return Err(BlueprintError::rate_limited(
                    name,
                    format!("local rate limit budget exhausted for provider '{}'", name),
                ));
            }
        }

        let Some(breaker) = self.circuit_breaker(&provider.id) else {
            self.limiter.refund(&provider.id, estimated);
            return Err(BlueprintError::circuit_open(name));
        };
        if !breaker.allow_request() {
            self.limiter.refund(&provider.id, estimated);
            return Err(BlueprintError::circuit_open(name));
        }

        let request = CompletionRequest {
            model: model.clone(),
            prompt: spec.prompt.clone(),
            system_prompt: spec.system_prompt.clone(),
            temperature: spec.temperature,
            max_tokens,
        };

        let operation_name = format!("{} completion", name);
        let started = Instant::now();
        let call = with_timeout(
            provider.config.timeout(),
            async {
                provider
                    .client
                    .complete(&request)
                    .await
                    .map_err(ForgeError::from)
            },
            &operation_name,
        );
        let outcome = with_cancel(cancel, call, "dispatch").await;
        let latency_ms = started.elapsed().as_millis() as u64;

        let completion = match outcome {
            Ok(completion) if completion.text.trim().is_empty() => Err(BlueprintError::new(
                ErrorCode::InvalidResponse,
                "provider returned empty completion",
            )
            .with_provider(name)),
            Ok(completion) => Ok(completion),
            Err(ForgeError::Cancelled(_)) => {
                breaker.release_probe();
                return Err(BlueprintError::cancelled("dispatch"));
            }
            Err(ForgeError::Provider(raw)) => {
                Err(ErrorClassifier::classify_provider_error(&raw, name))
            }
            Err(other) => Err(ErrorClassifier::classify_error(&other).with_provider(name)),
        };

        let completion = match completion {
            Ok(completion) => completion,
            Err(err) => {
                breaker.record_failure();
                self.usage.record_failure(name, latency_ms);
                warn!(
                    provider = name,
                    model = %model,
                    latency_ms,
                    code = %err.code,
                    error = %err.message,
                    "Provider call failed"
                );
                return Err(err);
            }
        };

        breaker.record_success();
        self.limiter
            .record_usage(&provider.id, u64::from(completion.usage.total_tokens));
        let usage = TokenUsage {
            cost_usd: provider.config.cost_for(&completion.usage),
            ..completion.usage
        };
        self.usage.record_success(name, &usage, latency_ms);

        info!(
            provider = name,
            model = %model,
            latency_ms,
            tokens = usage.total_tokens,
            cost_usd = usage.cost_usd,
            "Provider call succeeded"
        );

        let generated = Generated {
            text: completion.text,
            usage,
            metadata: ResponseMetadata {
                provider: name.to_string(),
                model,
                latency_ms,
                timestamp: Utc::now(),
                request_id,
                cached: false,
            },
        };

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.put(key, ResponseEnvelope::Success(generated.clone()), cache.default_ttl());
        }

        Ok(generated)
    }

    /// Probe every provider without spending tokens
    pub async fn test_connections(&self) -> BTreeMap<String, bool> {
        let probe_timeout = Duration::from_secs(network::PROBE_TIMEOUT_SECS);
        let probes = self.registry.iter().map(|p| async move {
            let reachable = with_timeout_map(probe_timeout, p.client.probe(), "connection probe")
                .await
                .unwrap_or(false);
            if !reachable {
                warn!(provider = %p.id, "Provider probe failed");
            }
            (p.id.name().to_string(), reachable)
        });

        join_all(probes).await.into_iter().collect()
    }

    pub fn provider_status(&self, id: &ProviderId) -> Result<ProviderStatus> {
        if self.registry.get(id).is_none() {
            return Err(ForgeError::UnknownProvider(id.name().to_string()));
        }

        let circuit_state = self
            .circuit_breaker(id)
            .map(|b| b.state())
            .unwrap_or(CircuitState::Closed);
        let rate_limited = self.limiter.is_exhausted(id);
        let circuit_breaker_open = circuit_state == CircuitState::Open;

        Ok(ProviderStatus {
            provider: id.name().to_string(),
            available: !rate_limited && !circuit_breaker_open,
            rate_limited,
            circuit_breaker_open,
            circuit_state,
        })
    }

    pub fn provider_statuses(&self) -> Vec<ProviderStatus> {
        self.registry
            .ids()
            .iter()
            .filter_map(|id| self.provider_status(id).ok())
            .collect()
    }
}

// =============================================================================
// Builder
// =============================================================================

pub struct AiServiceManagerBuilder {
    registry: Arc<ProviderRegistry>,
    routing: RoutingConfig,
    breaker_config: CircuitBreakerConfig,
    rate_window: Duration,
    cache: Option<Arc<ResponseCache>>,
    key_strategy: CacheKeyStrategy,
    usage: Option<Arc<UsageTracker>>,
}

impl AiServiceManagerBuilder {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            routing: RoutingConfig::default(),
            breaker_config: CircuitBreakerConfig::default(),
            rate_window: Duration::from_secs(rl_constants::WINDOW_SECS),
            cache: None,
            key_strategy: CacheKeyStrategy::default(),
            usage: None,
        }
    }

    pub fn routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    pub fn rate_window(mut self, window: Duration) -> Self {
        self.rate_window = window;
        self
    }

    pub fn cache(mut self, cache: Arc<ResponseCache>, key_strategy: CacheKeyStrategy) -> Self {
        self.cache = Some(cache);
        self.key_strategy = key_strategy;
        self
    }

    pub fn usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Resolves the fallback chain; unknown names fail here, not at dispatch
    pub fn build(self) -> Result<AiServiceManager> {
        let fallback_chain = if self.routing.fallback_chain.is_empty() {
            self.registry.ids()
        } else {
            self.routing
                .fallback_chain
                .iter()
                .map(|name| self.registry.resolve(name))
                .collect::<Result<Vec<_>>>()?
        };

        let breakers = DashMap::new();
        let limiter = RateLimiter::new(self.rate_window);
        for provider in self.registry.iter() {
            breakers.insert(
                provider.id.clone(),
                Arc::new(CircuitBreaker::new(
                    provider.id.name(),
                    self.breaker_config.clone(),
                )),
            );
            limiter.register(provider.id.clone(), provider.config.rate_limit);
        }

        info!(
            providers = self.registry.len(),
            strategy = %self.routing.strategy,
            chain = ?fallback_chain.iter().map(ProviderId::name).collect::<Vec<_>>(),
            cache = self.cache.is_some(),
            "AI service manager ready"
        );

        Ok(AiServiceManager {
            registry: self.registry,
            strategy: self.routing.strategy,
            fallback_chain,
            breakers,
            limiter,
            cache: self.cache,
            key_strategy: self.key_strategy,
            usage: self.usage.unwrap_or_default(),
            cursor: AtomicUsize::new(0),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
