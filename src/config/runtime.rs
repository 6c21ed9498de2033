//! Wiring from a validated [`Config`] to the running service graph.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::types::Config;
use crate::ai::cache::ResponseCache;
use crate::ai::manager::AiServiceManager;
use crate::ai::metrics::UsageTracker;
use crate::ai::provider::ProviderRegistry;
use crate::blueprint::GenerationOrchestrator;
use crate::progress::ProgressTracker;
use crate::types::Result;

/// Shared stores plus the orchestrator built on top of them
pub struct ForgeRuntime {
    pub config: Config,
    pub manager: Arc<AiServiceManager>,
    pub progress: Arc<ProgressTracker>,
    pub orchestrator: GenerationOrchestrator,
}

impl ForgeRuntime {
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(ProviderRegistry::from_configs(&config.providers)?);
        let mut builder = AiServiceManager::builder(registry)
            .routing(config.routing.clone())
            .circuit_breaker(config.circuit_breaker.clone())
            .rate_window(config.rate_limit.window())
            .usage(Arc::new(UsageTracker::new(config.alerts)));

        if config.cache.enabled {
            let cache = ResponseCache::new(config.cache.max_entries, config.cache.ttl());
            builder = builder.cache(Arc::new(cache), config.cache.key_strategy);
        }

        let manager = Arc::new(builder.build()?);
        let progress = Arc::new(ProgressTracker::new());
        let orchestrator = GenerationOrchestrator::new(Arc::clone(&manager), Arc::clone(&progress))
            .with_retry_policy(config.retry)
            .with_validation(config.validation)
            .with_temperature(config.generation.temperature)
            .with_section_caching(config.cache.enabled && config.generation.cache_sections);

        info!(
            providers = manager.registry().len(),
            cache = config.cache.enabled,
            max_retries = config.retry.max_retries,
            "Runtime initialized"
        );

        Ok(Self {
            config,
            manager,
            progress,
            orchestrator,
        })
    }

    /// Background sweeps of idle progress entries and expired cache entries.
    ///
    /// Every task stops once `cancel` fires.
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![self.progress.spawn_sweeper(
            self.config.progress.sweep_interval(),
            self.config.progress.max_age(),
            cancel.clone(),
        )];
        if let Some(cache) = self.manager.cache() {
            tasks.push(cache.spawn_purger(self.config.cache.purge_interval(), cancel));
        }
        tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::BlueprintRequest;
    use crate::types::GenerationId;

    #[tokio::test]
    async fn test_offline_runtime_generates_blueprint() {
        let mut config = Config::default().into_offline();
        config.cache.enabled = true;
        let runtime = ForgeRuntime::from_config(config).unwrap();

        let request = BlueprintRequest::new(
            "Recipe Planner",
            "Weekly meal planning with shopping lists generated from recipes",
        );
        let blueprint = runtime
            .orchestrator
            .generate_blueprint(GenerationId::generate(), request, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(blueprint.validation.score, 100);
        assert!(runtime.manager.cache().is_some_and(|c| c.len() == 5));
        assert_eq!(runtime.manager.usage().totals().requests, 5);
    }

    #[tokio::test]
    async fn test_maintenance_tasks_follow_cache_setting() {
        let cancel = CancellationToken::new();

        let plain = ForgeRuntime::from_config(Config::default().into_offline()).unwrap();
        let tasks = plain.spawn_maintenance(cancel.clone());
        assert_eq!(tasks.len(), 1);

        let mut config = Config::default().into_offline();
        config.cache.enabled = true;
        let cached = ForgeRuntime::from_config(config).unwrap();
        let cached_tasks = cached.spawn_maintenance(cancel.clone());
        assert_eq!(cached_tasks.len(), 2);

        cancel.cancel();
        for task in tasks.into_iter().chain(cached_tasks) {
            task.await.unwrap();
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.providers.clear();
        assert!(ForgeRuntime::from_config(config).is_err());
    }
}
