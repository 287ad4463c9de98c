//! Provider credentials and the active provider per category

use crate::errors::{HubError, HubResult};
use crate::models::{find_provider, Configuration, ProviderCategory, ProviderDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// API key and endpoint for one catalog provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCredential {
    pub provider_id: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    /// Overrides the catalog base URL
    #[serde(default)]
    pub base_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApiCredential {
    pub fn new(provider_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            provider_id: provider_id.into(),
            api_key: api_key.into(),
            base_url: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// A provider ready to be called: catalog entry plus credential
#[derive(Debug, Clone)]
pub struct ActiveProvider {
    pub definition: &'static ProviderDefinition,
    pub credential: ApiCredential,
}

impl ActiveProvider {
    pub fn base_url(&self) -> &str {
        self.credential
            .base_url
            .as_deref()
            .unwrap_or(self.definition.base_url)
    }
}

/// Credential store with one active provider per category
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    credentials: HashMap<String, ApiCredential>,
    active: HashMap<ProviderCategory, String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration, reading keys from the environment
    pub fn from_config(config: &Configuration) -> Self {
        let mut registry = Self::new();
        for entry in &config.providers {
            let api_key = match std::env::var(&entry.api_key_env) {
                Ok(key) if !key.trim().is_empty() => key,
                _ => {
                    tracing::warn!(
                        provider = entry.provider_id.as_str(),
                        env = entry.api_key_env.as_str(),
                        "API key variable not set, provider skipped"
                    );
                    continue;
                }
            };

            let mut credential = ApiCredential::new(&entry.provider_id, api_key);
            credential.base_url = entry.base_url.clone();
            if let Err(e) = registry.add_credential(credential) {
                tracing::warn!("Skipping provider {}: {}", entry.provider_id, e);
                continue;
            }
            if entry.active {
                if let Some(definition) = find_provider(&entry.provider_id) {
                    let _ = registry.set_active_provider(definition.category, &entry.provider_id);
                }
            }
        }
        registry
    }

    pub fn add_credential(&mut self, credential: ApiCredential) -> HubResult<()> {
        if find_provider(&credential.provider_id).is_none() {
            return Err(HubError::validation(format!(
                "Unknown provider '{}'",
                credential.provider_id
            )));
        }
        if self.credentials.contains_key(&credential.provider_id) {
            return Err(HubError::validation(format!(
                "Provider '{}' already has a credential",
                credential.provider_id
            )));
        }
        self.credentials
            .insert(credential.provider_id.clone(), credential);
        Ok(())
    }

    pub fn update_credential(&mut self, credential: ApiCredential) -> HubResult<()> {
        match self.credentials.get_mut(&credential.provider_id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = ApiCredential {
                    created_at,
                    updated_at: Utc::now(),
                    ..credential
                };
                Ok(())
            }
            None => Err(HubError::not_found("Credential", credential.provider_id)),
        }
    }

    /// Remove a credential; an active mapping to it is cleared too
    pub fn delete_credential(&mut self, provider_id: &str) -> bool {
        let removed = self.credentials.remove(provider_id).is_some();
        if removed {
            self.active.retain(|_, id| id != provider_id);
        }
        removed
    }

    pub fn credential(&self, provider_id: &str) -> Option<&ApiCredential> {
        self.credentials.get(provider_id)
    }

    pub fn credentials(&self) -> impl Iterator<Item = &ApiCredential> {
        self.credentials.values()
    }

    /// Make `provider_id` the active provider for `category`
    pub fn set_active_provider(
        &mut self,
        category: ProviderCategory,
        provider_id: &str,
    ) -> HubResult<()> {
        let definition = find_provider(provider_id)
            .ok_or_else(|| HubError::not_found("Provider", provider_id))?;
        if definition.category != category {
            return Err(HubError::validation(format!(
                "Provider '{}' serves {}, not {}",
                provider_id, definition.category, category
            )));
        }
        self.active.insert(category, provider_id.to_string());
        Ok(())
    }

    pub fn clear_active_provider(&mut self, category: ProviderCategory) {
        self.active.remove(&category);
    }

    /// Active provider for `category`, when it has an active credential
    pub fn active(&self, category: ProviderCategory) -> Option<ActiveProvider> {
        let provider_id = self.active.get(&category)?;
        let definition = find_provider(provider_id)?;
        let credential = self.credentials.get(provider_id)?;
        if !credential.is_active {
            return None;
        }
        Some(ActiveProvider {
            definition,
            credential: credential.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_requires_credential_and_mapping() {
        let mut registry = ProviderRegistry::new();
        registry
            .set_active_provider(ProviderCategory::Image, "openai-dalle")
            .unwrap();
        assert!(registry.active(ProviderCategory::Image).is_none());

        registry
            .add_credential(ApiCredential::new("openai-dalle", "sk-test"))
            .unwrap();
        let active = registry.active(ProviderCategory::Image).unwrap();
        assert_eq!(active.definition.id, "openai-dalle");
        assert_eq!(active.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_inactive_credential_is_ignored() {
        let mut registry = ProviderRegistry::new();
        let mut credential = ApiCredential::new("suno", "key");
        credential.is_active = false;
        registry.add_credential(credential).unwrap();
        registry
            .set_active_provider(ProviderCategory::Music, "suno")
            .unwrap();
        assert!(registry.active(ProviderCategory::Music).is_none());
    }

    #[test]
    fn test_category_mismatch_and_unknown_provider() {
        let mut registry = ProviderRegistry::new();
        assert!(registry
            .set_active_provider(ProviderCategory::Voice, "suno")
            .is_err());
        assert!(registry
            .add_credential(ApiCredential::new("made-up", "key"))
            .is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let mut registry = ProviderRegistry::new();
        registry
            .add_credential(ApiCredential::new("elevenlabs", "old"))
            .unwrap();
        registry
            .set_active_provider(ProviderCategory::Voice, "elevenlabs")
            .unwrap();

        registry
            .update_credential(ApiCredential::new("elevenlabs", "new"))
            .unwrap();
        assert_eq!(registry.credential("elevenlabs").unwrap().api_key, "new");

        assert!(registry.delete_credential("elevenlabs"));
        assert!(registry.active(ProviderCategory::Voice).is_none());
        assert!(registry
            .update_credential(ApiCredential::new("elevenlabs", "x"))
            .is_err());
    }
}
