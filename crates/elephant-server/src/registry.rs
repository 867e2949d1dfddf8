//! Provider registry. Built once at startup, read-only afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use elephant_core::Provider;

struct RegistryEntry {
    provider: Arc<dyn Provider>,
    /// Probed once at registration; unavailable providers stay listed but
    /// are never dispatched to.
    available: bool,
}

#[derive(Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, RegistryEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut registry = Self::new();
        for provider in providers {
            registry.register(provider);
        }
        registry
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let available = provider.available();
        let name = provider.name().to_string();
        tracing::info!(provider = %name, available, "Provider registered");
        self.providers
            .insert(name, RegistryEntry { provider, available });
    }

    /// The provider, if present and available. Queries and activations go
    /// through here.
    pub fn dispatchable(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .filter(|e| e.available)
            .map(|e| Arc::clone(&e.provider))
    }

    /// The provider regardless of availability, for listings and state.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(|e| Arc::clone(&e.provider))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, pretty_name)` of listable providers, sorted by name.
    pub fn visible(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .providers
            .values()
            .filter(|e| e.available && !e.provider.hidden_from_list())
            .map(|e| {
                (
                    e.provider.name().to_string(),
                    e.provider.pretty_name().to_string(),
                )
            })
            .collect();
        out.sort();
        out
    }

    pub fn count(&self) -> usize {
        self.providers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use elephant_core::{ActivateContext, Item, ProviderError, QueryContext};

    struct StubProvider {
        name: &'static str,
        available: bool,
        hidden: bool,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }
        fn available(&self) -> bool {
            self.available
        }
        fn hidden_from_list(&self) -> bool {
            self.hidden
        }
        async fn query(&self, _ctx: QueryContext) -> Vec<Item> {
            Vec::new()
        }
        async fn activate(&self, _ctx: ActivateContext) -> Result<(), ProviderError> {
            Ok(())
        }
    }

    fn stub(name: &'static str, available: bool, hidden: bool) -> Arc<dyn Provider> {
        Arc::new(StubProvider {
            name,
            available,
            hidden,
        })
    }

    #[test]
    fn register_and_lookup() {
        let registry = ProviderRegistry::with_providers(vec![stub("files", true, false)]);
        assert!(registry.contains("files"));
        assert!(registry.dispatchable("files").is_some());
        assert!(registry.dispatchable("nope").is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unavailable_provider_is_listed_but_not_dispatchable() {
        let registry = ProviderRegistry::with_providers(vec![stub("bluetooth", false, false)]);
        assert!(registry.contains("bluetooth"));
        assert!(registry.get("bluetooth").is_some());
        assert!(registry.dispatchable("bluetooth").is_none());
    }

    #[test]
    fn visible_skips_hidden_and_unavailable() {
        let registry = ProviderRegistry::with_providers(vec![
            stub("files", true, false),
            stub("secret", true, true),
            stub("bluetooth", false, false),
        ]);
        let visible = registry.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].0, "files");
    }

    #[test]
    fn names_are_sorted() {
        let registry = ProviderRegistry::with_providers(vec![
            stub("websearch", true, false),
            stub("files", true, false),
            stub("menus", true, false),
        ]);
        assert_eq!(registry.names(), vec!["files", "menus", "websearch"]);
    }
}
