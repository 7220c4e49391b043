// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LifeOS Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - generation backends (LLM providers + alias mapping)
// - generation sampling, retry and time budget
// - embedding backend and vector store files
// - memory lifecycle, caches, self-healing thresholds
// - storage, background jobs and logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lifeos_cortex::application::{LifecycleSchedulerConfig, RagConfig};

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const CONFIG_KIND: &str = "LifeOsConfig";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifeOsConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "LifeOsConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: LifeOsConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LifeOsConfigSpec {
    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    #[serde(default)]
    pub llm_selection: LLMSelection,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub rag: RagConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "ollama-local", "openai")
    pub name: String,

    /// "ollama", "openai" or "openai-compatible"
    #[serde(rename = "type")]
    pub provider_type: String,

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias referenced by `generation.model_alias` (e.g. "default", "fast")
    pub alias: String,

    /// Model identifier for the provider API
    pub model: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LLMSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    /// Used when an alias is not mapped to any provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default = "default_model_alias")]
    pub model_alias: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Initial attempt plus retries
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before retry n is `base * 2^(n-1)`
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Wall-clock bound for the whole retry loop
    #[serde(default = "default_budget_seconds")]
    pub budget_seconds: u64,

    /// Rules retrieved for the prompt
    #[serde(default = "default_rules_k")]
    pub rules_k: usize,

    /// Long-term memories included in the prompt
    #[serde(default = "default_memory_limit")]
    pub memory_limit: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_alias: default_model_alias(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            budget_seconds: default_budget_seconds(),
            rules_k: default_rules_k(),
            memory_limit: default_memory_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "ollama" or "hash" (offline, deterministic)
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout")]
    pub timeout_seconds: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            endpoint: default_ollama_endpoint(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_seconds: default_embedding_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub lifecycle: LifecycleSchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL of assembled generation payloads
    #[serde(default = "default_context_ttl")]
    pub context_ttl_seconds: u64,

    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            context_ttl_seconds: default_context_ttl(),
            max_capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Gaps longer than this between timed tasks get a routine block
    #[serde(default = "default_gap_threshold")]
    pub gap_threshold_minutes: u32,

    /// Shortest duration a task keeps after being shifted
    #[serde(default = "default_min_task_minutes")]
    pub min_task_minutes: u32,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            gap_threshold_minutes: default_gap_threshold(),
            min_task_minutes: default_min_task_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres URL; in-memory storage when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deliveries per job before it is given up
    #[serde(default = "default_job_attempts")]
    pub max_attempts: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
            max_attempts: default_job_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_model_alias() -> String {
    "default".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    768
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_budget_seconds() -> u64 {
    120
}

fn default_rules_k() -> usize {
    3
}

fn default_memory_limit() -> usize {
    5
}

fn default_embedding_provider() -> String {
    "ollama".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedding_model() -> String {
    lifeos_cortex::infrastructure::embedding_client::DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    lifeos_cortex::infrastructure::embedding_client::DEFAULT_EMBEDDING_DIM
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_context_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_gap_threshold() -> u32 {
    60
}

fn default_min_task_minutes() -> u32 {
    15
}

fn default_max_connections() -> u32 {
    5
}

fn default_queue_capacity() -> usize {
    256
}

fn default_workers() -> usize {
    2
}

fn default_job_attempts() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for LifeOsConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "lifeos".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: LifeOsConfigSpec::default(),
        }
    }
}

impl LifeOsConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. LIFEOS_CONFIG_PATH environment variable
    /// 2. ./lifeos-config.yaml (working directory)
    /// 3. ~/.lifeos/config.yaml (user home)
    /// 4. /etc/lifeos/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("LIFEOS_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./lifeos-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".lifeos").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/lifeos/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment overrides for container deployments
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("LIFEOS_DATABASE_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: LIFEOS_DATABASE_URL");
            self.spec.database.url = Some(url);
        }

        if let Some(endpoint) = lookup("LIFEOS_OLLAMA_ENDPOINT").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: LIFEOS_OLLAMA_ENDPOINT={}", endpoint);
            self.spec.embedding.endpoint = endpoint.clone();
            for provider in self
                .spec
                .llm_providers
                .iter_mut()
                .filter(|p| p.provider_type == "ollama")
            {
                provider.endpoint = endpoint.clone();
            }
        }

        if let Some(model) = lookup("LIFEOS_EMBEDDING_MODEL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: LIFEOS_EMBEDDING_MODEL={}", model);
            self.spec.embedding.model = model;
        }

        if let Some(level) = lookup("LIFEOS_LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.spec.logging.level = level;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let spec = &self.spec;
        for provider in &spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }
            if provider.endpoint.is_empty() {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }
            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }
            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }
                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        for (role, name) in [
            ("Default", &spec.llm_selection.default_provider),
            ("Fallback", &spec.llm_selection.fallback_provider),
        ] {
            if let Some(name) = name {
                if !spec.llm_providers.iter().any(|p| &p.name == name) {
                    anyhow::bail!("{} provider '{}' not found in llm_providers", role, name);
                }
            }
        }

        let generation = &spec.generation;
        if !(0.0..=2.0).contains(&generation.temperature) {
            anyhow::bail!("generation.temperature must be within 0.0..=2.0");
        }
        if generation.max_tokens == 0 {
            anyhow::bail!("generation.max_tokens must be positive");
        }
        if generation.max_attempts == 0 {
            anyhow::bail!("generation.max_attempts must be at least 1");
        }
        if generation.budget_seconds == 0 {
            anyhow::bail!("generation.budget_seconds must be positive");
        }

        if !matches!(spec.embedding.provider.as_str(), "ollama" | "hash") {
            anyhow::bail!(
                "Unsupported embedding provider '{}'. Expected 'ollama' or 'hash'",
                spec.embedding.provider
            );
        }
        if spec.embedding.dimension == 0 {
            anyhow::bail!("embedding.dimension must be positive");
        }
        if spec.rag.default_k == 0 {
            anyhow::bail!("rag.default_k must be positive");
        }
        if spec.persistence.min_task_minutes == 0 {
            anyhow::bail!("persistence.min_task_minutes must be positive");
        }
        if spec.jobs.queue_capacity == 0 || spec.jobs.workers == 0 {
            anyhow::bail!("jobs.queue_capacity and jobs.workers must be positive");
        }
        if spec.jobs.max_attempts == 0 {
            anyhow::bail!("jobs.max_attempts must be at least 1");
        }
        if !matches!(spec.logging.format.as_str(), "compact" | "json") {
            anyhow::bail!(
                "Unsupported logging.format '{}'. Expected 'compact' or 'json'",
                spec.logging.format
            );
        }

        Ok(())
    }
}
