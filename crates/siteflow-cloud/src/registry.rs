//! Provider registry
//!
//! Startup-time mapping from provider slug to adapter. The orchestrator and
//! services take the registry as an explicit constructor argument; there is
//! no ambient global lookup.

use crate::error::{CloudError, Result};
use crate::provider::ServerProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of provider adapters keyed by slug
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ServerProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its identity slug
    ///
    /// Registering a second adapter with the same slug replaces the first.
    pub fn register(&mut self, provider: Arc<dyn ServerProvider>) {
        let slug = provider.identity().slug.clone();
        tracing::debug!(provider = %slug, "Registered cloud provider");
        self.providers.insert(slug, provider);
    }

    /// Resolve an adapter by slug
    pub fn get(&self, slug: &str) -> Result<Arc<dyn ServerProvider>> {
        self.providers
            .get(slug)
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotFound(slug.to_string()))
    }

    /// All registered slugs, sorted
    pub fn slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.providers.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("slugs", &self.slugs())
            .finish()
    }
}
