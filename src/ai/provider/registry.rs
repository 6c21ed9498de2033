//! Typed Provider Registry
//!
//! Built once at startup. [`ProviderId`] handles can only be obtained from a
//! registry, so requests cannot name a provider that was never configured.

use std::collections::HashSet;
use std::sync::Arc;

use super::{ProviderConfig, SharedClient, create_client};
use crate::types::{ForgeError, Result};

/// Handle to a registered provider
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId {
    index: usize,
    name: Arc<str>,
}

impl ProviderId {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A provider's identity, static configuration and client
pub struct RegisteredProvider {
    pub id: ProviderId,
    pub config: ProviderConfig,
    pub client: SharedClient,
}

/// Immutable set of configured providers
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::new()
    }

    /// Build from configuration, creating each vendor client
    pub fn from_configs(configs: &[ProviderConfig]) -> Result<Self> {
        let mut builder = Self::builder();
        for config in configs {
            let client = create_client(config)?;
            builder = builder.register(config.clone(), client);
        }
        builder.build()
    }

    /// Look up a provider by name
    pub fn id(&self, name: &str) -> Option<ProviderId> {
        self.providers
            .iter()
            .find(|p| p.config.name == name)
            .map(|p| p.id.clone())
    }

    /// Look up a provider by name, failing for unconfigured names
    pub fn resolve(&self, name: &str) -> Result<ProviderId> {
        self.id(name)
            .ok_or_else(|| ForgeError::UnknownProvider(name.to_string()))
    }

    pub fn get(&self, id: &ProviderId) -> Option<&RegisteredProvider> {
        self.providers
            .get(id.index())
            .filter(|p| p.id.name == id.name)
    }

    /// Registration order
    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.iter().map(|p| p.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Builder that validates names before producing a registry
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    entries: Vec<(ProviderConfig, SharedClient)>,
}

impl ProviderRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider with an explicit client
    pub fn register(mut self, config: ProviderConfig, client: SharedClient) -> Self {
        self.entries.push((config, client));
        self
    }

    pub fn build(self) -> Result<ProviderRegistry> {
        if self.entries.is_empty() {
            return Err(ForgeError::Config("No providers configured".to_string()));
        }

        let mut seen = HashSet::new();
        for (config, _) in &self.entries {
            if config.name.trim().is_empty() {
                return Err(ForgeError::Config("Provider name must not be empty".to_string()));
            }
            if !seen.insert(config.name.clone()) {
                return Err(ForgeError::Config(format!(
                    "Duplicate provider name: {}",
                    config.name
                )));
            }
        }

        let providers = self
            .entries
            .into_iter()
            .enumerate()
            .map(|(index, (config, client))| RegisteredProvider {
                id: ProviderId {
                    index,
                    name: Arc::from(config.name.as_str()),
                },
                config,
                client,
            })
            .collect();

        Ok(ProviderRegistry { providers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::{OfflineProvider, ProviderKind};

    fn offline(name: &str) -> (ProviderConfig, SharedClient) {
        (
            ProviderConfig::new(name, ProviderKind::Offline),
            Arc::new(OfflineProvider::new()),
        )
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let (ca, a) = offline("a");
        let (cb, b) = offline("b");
        let registry = ProviderRegistry::builder()
            .register(ca, a)
            .register(cb, b)
            .build()
            .unwrap();

        let id = registry.resolve("b").unwrap();
        assert_eq!(id.name(), "b");
        assert_eq!(registry.get(&id).unwrap().config.name, "b");
        assert!(matches!(
            registry.resolve("c"),
            Err(ForgeError::UnknownProvider(name)) if name == "c"
        ));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let (ca, a) = offline("a");
        let (ca2, a2) = offline("a");
        let result = ProviderRegistry::builder()
            .register(ca, a)
            .register(ca2, a2)
            .build();
        assert!(matches!(result, Err(ForgeError::Config(_))));

        assert!(ProviderRegistry::builder().build().is_err());
    }

    #[test]
    fn test_foreign_id_is_not_resolved() {
        let (ca, a) = offline("a");
        let first = ProviderRegistry::builder().register(ca, a).build().unwrap();
        let (cz, z) = offline("z");
        let second = ProviderRegistry::builder().register(cz, z).build().unwrap();

        let foreign = second.resolve("z").unwrap();
        assert!(first.get(&foreign).is_none());
    }

    #[test]
    fn test_from_configs_offline() {
        let registry =
            ProviderRegistry::from_configs(&[ProviderConfig::new("local", ProviderKind::Offline)])
                .unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.ids()[0].name(), "local");
    }
}
