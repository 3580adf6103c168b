//! Named backends available for binding

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::ProviderAdapter;
use crate::types::AdFormat;

/// Backends keyed by descriptor name
///
/// Handed to the mediator at initialization; settings pick one entry per format.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// Register a backend under its descriptor name
    ///
    /// Returns the backend previously registered under that name, if any.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) -> Option<Arc<dyn ProviderAdapter>> {
        let name = adapter.name().to_string();
        let previous = self.providers.insert(name.clone(), adapter);
        if previous.is_some() {
            tracing::warn!("Provider {} registered twice, replacing", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of backends that can serve `format`, sorted
    pub fn supporting(&self, format: AdFormat) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .filter(|(_, adapter)| adapter.descriptor().supports(format))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{SimulatedProvider, SimulatorConfig};
    use crate::types::ProviderDescriptor;

    #[test]
    fn test_register_and_lookup() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(SimulatedProvider::new("alpha", SimulatorConfig::instant())))
            .with(Arc::new(SimulatedProvider::with_descriptor(
                ProviderDescriptor::new("beta", [AdFormat::Banner]),
                SimulatorConfig::instant(),
            )));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["alpha", "beta"]);
        assert!(registry.get("alpha").is_some());
        assert!(registry.get("gamma").is_none());
        assert_eq!(registry.supporting(AdFormat::Banner), vec!["alpha", "beta"]);
        assert_eq!(registry.supporting(AdFormat::Rewarded), vec!["alpha"]);
    }

    #[test]
    fn test_duplicate_name_replaces() {
        let mut registry = ProviderRegistry::new();
        assert!(registry
            .register(Arc::new(SimulatedProvider::new("dup", SimulatorConfig::instant())))
            .is_none());
        assert!(registry
            .register(Arc::new(SimulatedProvider::new("dup", SimulatorConfig::default())))
            .is_some());
        assert_eq!(registry.len(), 1);
    }
}
