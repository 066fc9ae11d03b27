//! Provider lookup by id

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use kubefoundry_common::{Error, Result};

use super::version::{VersionCache, VersionSource, DEFAULT_VERSION_TTL};
use super::{dynamo, kaito, kuberay, DynamoProvider, KaitoProvider, KubeRayProvider, Provider};

/// How the built-in providers are constructed
#[derive(Clone)]
pub struct RegistryOptions {
    /// Latest-release lookup; `None` keeps every provider on its pinned version
    pub version_source: Option<Arc<dyn VersionSource>>,
    /// Version cache TTL
    pub version_ttl: Duration,
    /// Pinned-version overrides keyed by provider id
    pub pinned_versions: BTreeMap<String, String>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            version_source: None,
            version_ttl: DEFAULT_VERSION_TTL,
            pinned_versions: BTreeMap::new(),
        }
    }
}

impl RegistryOptions {
    fn version_cache(&self, id: &str, repository: &'static str, pinned: &str) -> VersionCache {
        let pinned = self
            .pinned_versions
            .get(id)
            .map(String::as_str)
            .unwrap_or(pinned);
        VersionCache::new(repository, pinned)
            .with_source(self.version_source.clone())
            .with_ttl(self.version_ttl)
    }
}

/// Registered providers, keyed by id
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// KAITO, Dynamo and KubeRay
    pub fn builtin(options: &RegistryOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(KaitoProvider::new(options.version_cache(
            kaito::PROVIDER_ID,
            kaito::GITHUB_REPOSITORY,
            kaito::PINNED_VERSION,
        ))));
        registry.register(Arc::new(DynamoProvider::new(options.version_cache(
            dynamo::PROVIDER_ID,
            dynamo::GITHUB_REPOSITORY,
            dynamo::PINNED_VERSION,
        ))));
        registry.register(Arc::new(KubeRayProvider::new(options.version_cache(
            kuberay::PROVIDER_ID,
            kuberay::GITHUB_REPOSITORY,
            kuberay::PINNED_VERSION,
        ))));
        registry
    }

    /// Add or replace a provider
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        debug!(provider = provider.id(), "Registered provider");
        self.providers.insert(provider.id(), provider);
    }

    /// Look up a provider; unknown ids are a configuration error
    pub fn get(&self, id: &str) -> Result<&dyn Provider> {
        self.providers
            .get(id)
            .map(|p| p.as_ref())
            .ok_or_else(|| Error::unknown_provider(id))
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.keys().copied().collect()
    }

    /// Every provider, sorted by id
    pub fn iter(&self) -> impl Iterator<Item = &dyn Provider> {
        self.providers.values().map(|p| p.as_ref())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registers_every_runtime() {
        let registry = ProviderRegistry::builtin(&RegistryOptions::default());
        assert_eq!(registry.ids(), vec!["dynamo", "kaito", "kuberay"]);
        assert_eq!(registry.get("kaito").unwrap().display_name(), "KAITO");
        assert_eq!(registry.iter().count(), 3);
    }

    #[test]
    fn unknown_id_is_an_error() {
        let registry = ProviderRegistry::builtin(&RegistryOptions::default());
        match registry.get("ollama") {
            Err(Error::UnknownProvider { id }) => assert_eq!(id, "ollama"),
            Err(other) => panic!("expected UnknownProvider, got {other:?}"),
            Ok(_) => panic!("expected UnknownProvider"),
        }
    }

    #[tokio::test]
    async fn pinned_override_applies() {
        let options = RegistryOptions {
            pinned_versions: BTreeMap::from([("kuberay".to_string(), "1.3.0".to_string())]),
            ..Default::default()
        };
        let registry = ProviderRegistry::builtin(&options);
        assert_eq!(registry.get("kuberay").unwrap().latest_version().await, "1.3.0");
        assert_eq!(registry.get("kaito").unwrap().latest_version().await, "0.6.0");
    }
}
