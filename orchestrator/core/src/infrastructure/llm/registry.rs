// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Registry - Model Alias Resolution and Provider Management
//
// Builds adapters from the `llm_providers` config section through a static
// constructor table keyed by provider type, and resolves model aliases to a
// concrete adapter. Retry policy belongs to the caller (the plan generator).

use crate::domain::config::{LLMProviderConfig, LifeOsConfigSpec};
use crate::domain::llm::{LLMError, LLMProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::ollama::OllamaAdapter;
use super::openai::OpenAIAdapter;

type ProviderConstructor = fn(&LLMProviderConfig, String, String) -> Arc<dyn LLMProvider>;

/// Provider type -> constructor(config, api_key, model)
const PROVIDER_CONSTRUCTORS: &[(&str, ProviderConstructor)] = &[
    ("ollama", build_ollama),
    ("openai", build_openai),
    ("openai-compatible", build_openai_compatible),
];

fn build_ollama(config: &LLMProviderConfig, _api_key: String, model: String) -> Arc<dyn LLMProvider> {
    Arc::new(OllamaAdapter::new(config.endpoint.clone(), model))
}

fn build_openai(config: &LLMProviderConfig, api_key: String, model: String) -> Arc<dyn LLMProvider> {
    Arc::new(OpenAIAdapter::new(config.endpoint.clone(), api_key, model))
}

fn build_openai_compatible(
    config: &LLMProviderConfig,
    api_key: String,
    model: String,
) -> Arc<dyn LLMProvider> {
    Arc::new(OpenAIAdapter::with_label(
        config.endpoint.clone(),
        api_key,
        model,
        "openai-compatible",
    ))
}

/// An adapter bound to one concrete model
#[derive(Clone)]
pub struct ResolvedProvider {
    pub provider_name: String,
    pub model: String,
    pub provider: Arc<dyn LLMProvider>,
}

/// Registry for managing LLM providers and resolving model aliases
#[derive(Default)]
pub struct ProviderRegistry {
    /// provider name -> adapter for its first model
    providers: HashMap<String, ResolvedProvider>,
    /// alias -> adapter for the aliased model
    alias_map: HashMap<String, ResolvedProvider>,
    default_provider: Option<String>,
    fallback_provider: Option<String>,
}

impl ProviderRegistry {
    pub fn from_config(spec: &LifeOsConfigSpec) -> anyhow::Result<Self> {
        let mut registry = Self {
            default_provider: spec.llm_selection.default_provider.clone(),
            fallback_provider: spec.llm_selection.fallback_provider.clone(),
            ..Self::default()
        };

        info!("Initializing LLM provider registry");

        for provider_config in &spec.llm_providers {
            if !provider_config.enabled {
                info!("Provider '{}' disabled, skipping", provider_config.name);
                continue;
            }

            if let Err(e) = registry.register_config(provider_config) {
                warn!("Failed to initialize provider '{}': {}", provider_config.name, e);
            }
        }

        if registry.providers.is_empty() {
            warn!("No LLM providers configured - plans will use the deterministic fallback");
        }

        Ok(registry)
    }

    fn register_config(&mut self, config: &LLMProviderConfig) -> anyhow::Result<()> {
        let constructor = PROVIDER_CONSTRUCTORS
            .iter()
            .find(|(provider_type, _)| *provider_type == config.provider_type)
            .map(|(_, constructor)| *constructor)
            .ok_or_else(|| anyhow::anyhow!("Unsupported provider type: {}", config.provider_type))?;

        if config.models.is_empty() {
            anyhow::bail!("No models configured");
        }

        let api_key = Self::resolve_api_key(&config.api_key)?;

        for (index, model_config) in config.models.iter().enumerate() {
            info!(
                "Mapping alias '{}' -> {} ({})",
                model_config.alias, model_config.model, config.name
            );
            let resolved = ResolvedProvider {
                provider_name: config.name.clone(),
                model: model_config.model.clone(),
                provider: constructor(config, api_key.clone(), model_config.model.clone()),
            };
            if index == 0 {
                self.providers.insert(config.name.clone(), resolved.clone());
            }
            self.alias_map.insert(model_config.alias.clone(), resolved);
        }

        Ok(())
    }

    /// Register an already-built adapter under `name` and `alias`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        alias: impl Into<String>,
        model: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
    ) {
        let name = name.into();
        let resolved = ResolvedProvider {
            provider_name: name.clone(),
            model: model.into(),
            provider,
        };
        self.providers.entry(name).or_insert_with(|| resolved.clone());
        self.alias_map.insert(alias.into(), resolved);
    }

    /// Resolve API key from config (supports "env:VAR_NAME" syntax)
    fn resolve_api_key(key: &Option<String>) -> anyhow::Result<String> {
        match key {
            Some(k) => match k.strip_prefix("env:") {
                Some(var_name) => std::env::var(var_name)
                    .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
                None => Ok(k.clone()),
            },
            // Local providers without auth
            None => Ok(String::new()),
        }
    }

    /// Alias first, then the default provider, then the fallback provider
    pub fn resolve(&self, alias: &str) -> Option<ResolvedProvider> {
        if let Some(resolved) = self.alias_map.get(alias) {
            return Some(resolved.clone());
        }

        [&self.default_provider, &self.fallback_provider]
            .into_iter()
            .flatten()
            .find_map(|name| self.providers.get(name))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn health_check_all(&self) -> HashMap<String, Result<(), LLMError>> {
        let mut results = HashMap::new();

        for (name, resolved) in &self.providers {
            info!("Health checking provider: {}", name);
            results.insert(name.clone(), resolved.provider.health_check().await);
        }

        results
    }

    pub fn available_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.alias_map.keys().cloned().collect();
        aliases.sort();
        aliases
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.alias_map.contains_key(alias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{LLMSelection, ModelConfig};

    fn provider(name: &str, provider_type: &str, aliases: &[(&str, &str)]) -> LLMProviderConfig {
        LLMProviderConfig {
            name: name.to_string(),
            provider_type: provider_type.to_string(),
            endpoint: "http://localhost:11434".to_string(),
            api_key: None,
            enabled: true,
            models: aliases
                .iter()
                .map(|(alias, model)| ModelConfig {
                    alias: alias.to_string(),
                    model: model.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_registry_creation() {
        let spec = LifeOsConfigSpec {
            llm_providers: vec![provider(
                "local",
                "ollama",
                &[("default", "llama3.2"), ("fast", "phi3")],
            )],
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&spec).unwrap();
        assert_eq!(registry.available_aliases(), vec!["default", "fast"]);

        let fast = registry.resolve("fast").unwrap();
        assert_eq!(fast.provider_name, "local");
        assert_eq!(fast.model, "phi3");
    }

    #[test]
    fn test_unknown_type_and_disabled_are_skipped() {
        let mut disabled = provider("off", "ollama", &[("default", "llama3.2")]);
        disabled.enabled = false;
        let spec = LifeOsConfigSpec {
            llm_providers: vec![disabled, provider("odd", "anthropic", &[("default", "claude")])],
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&spec).unwrap();
        assert!(registry.is_empty());
        assert!(registry.resolve("default").is_none());
    }

    #[test]
    fn test_unmapped_alias_uses_fallback_provider() {
        let spec = LifeOsConfigSpec {
            llm_providers: vec![provider("local", "ollama", &[("default", "llama3.2")])],
            llm_selection: LLMSelection {
                default_provider: None,
                fallback_provider: Some("local".into()),
            },
            ..Default::default()
        };

        let registry = ProviderRegistry::from_config(&spec).unwrap();
        let resolved = registry.resolve("smart").unwrap();
        assert_eq!(resolved.model, "llama3.2");
    }

    #[test]
    fn test_api_key_resolution() {
        assert_eq!(
            ProviderRegistry::resolve_api_key(&Some("sk-inline".into())).unwrap(),
            "sk-inline"
        );
        assert_eq!(ProviderRegistry::resolve_api_key(&None).unwrap(), "");
        assert!(ProviderRegistry::resolve_api_key(&Some(
            "env:LIFEOS_TEST_SURELY_UNSET_KEY".into()
        ))
        .is_err());
    }
}
