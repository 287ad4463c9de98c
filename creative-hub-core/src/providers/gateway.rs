//! Provider gateway: live provider per category with mock fallback

use crate::errors::HubResult;
use crate::models::{Configuration, ProviderCategory};
use crate::providers::http::HttpProvider;
use crate::providers::mock::MockProvider;
use crate::providers::registry::ProviderRegistry;
use crate::providers::{with_fallback, GenerationProvider, GenerationRequest, Sourced};
use dashmap::DashMap;
use reqwest::Client;
use serde_json::Value;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Routes generation requests to the active provider, falling back to the mock
pub struct ProviderGateway {
    registry: RwLock<ProviderRegistry>,
    overrides: DashMap<ProviderCategory, Arc<dyn GenerationProvider>>,
    mock: Arc<MockProvider>,
    client: Client,
    timeout: Duration,
}

impl ProviderGateway {
    pub fn new(registry: ProviderRegistry, timeout: Duration) -> Self {
        Self {
            registry: RwLock::new(registry),
            overrides: DashMap::new(),
            mock: Arc::new(MockProvider::new()),
            client: Client::new(),
            timeout,
        }
    }

    /// Gateway with no live providers; everything is served by the mock
    pub fn mock_only() -> Self {
        Self::new(ProviderRegistry::new(), Duration::from_secs(30))
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(
            ProviderRegistry::from_config(config),
            Duration::from_secs(config.provider_timeout_secs),
        )
    }

    /// Use `provider` for `category` instead of the registry's choice
    pub fn set_override(&self, category: ProviderCategory, provider: Arc<dyn GenerationProvider>) {
        self.overrides.insert(category, provider);
    }

    pub fn clear_override(&self, category: ProviderCategory) {
        self.overrides.remove(&category);
    }

    /// Edit the credential registry in place
    pub fn update_registry<R>(&self, apply: impl FnOnce(&mut ProviderRegistry) -> R) -> R {
        let mut registry = match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        apply(&mut registry)
    }

    pub fn mock(&self) -> &MockProvider {
        &self.mock
    }

    /// Live provider for `category`, if one is configured
    pub fn live_provider(&self, category: ProviderCategory) -> Option<Arc<dyn GenerationProvider>> {
        if let Some(provider) = self.overrides.get(&category) {
            return Some(provider.value().clone());
        }
        let registry = match self.registry.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        registry.active(category).map(|active| {
            Arc::new(HttpProvider::from_active(&active, self.timeout, self.client.clone()))
                as Arc<dyn GenerationProvider>
        })
    }

    /// Live provider first, mock on any failure or when none is configured
    pub async fn generate(&self, request: GenerationRequest) -> HubResult<Sourced<Value>> {
        let live = self.live_provider(request.category);
        let label = live
            .as_ref()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| request.category.to_string());
        let attempt = live.as_ref().map(|provider| provider.generate(&request));
        let mock = self.mock.clone();
        let fallback_request = request.clone();
        with_fallback(&label, attempt, move || async move {
            mock.generate(&fallback_request).await
        })
        .await
    }
}

impl std::fmt::Debug for ProviderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderGateway")
            .field("overrides", &self.overrides.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
