// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - cache secret and per-layer TTLs
// - circuit breaker thresholds and cooldowns
// - retry policy and agent timeouts
// - adaptive splitting and fallback for agents
// - retrieval sources and RRF parameters
// - completion provider and optional PostgreSQL persistence

use serde::{Deserialize, Serialize};
use sparkplan_cortex::{KnowledgeSource, DEFAULT_MAX_KEYWORDS, DEFAULT_RRF_K, DEFAULT_SEARCH_LIMIT};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::cache_key::DEFAULT_QUERY_MAX_CHARS;
use crate::domain::circuit_breaker::BreakerConfig;
use crate::domain::job::AgentKind;
use crate::domain::retry::RetryPolicy;

pub const API_VERSION: &str = "sparkplan.dev/v1";
pub const KIND: &str = "OrchestratorConfig";
pub const CONFIG_PATH_ENV: &str = "SPARKPLAN_CONFIG_PATH";

const DAY: u64 = 24 * 60 * 60;

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfigManifest {
    /// API version (must be "sparkplan.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "OrchestratorConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: OrchestratorConfigSpec,
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
pub struct OrchestratorConfigSpec {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub breaker: BreakerSettings,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Mixed into every hashed key (supports "env:VAR_NAME")
    #[serde(default = "default_secret")]
    pub secret: String,

    /// L1 time-to-live
    #[serde(default = "default_full_result_ttl", with = "humantime_serde")]
    pub full_result_ttl: Duration,

    /// L2 time-to-live
    #[serde(default = "default_retrieval_ttl", with = "humantime_serde")]
    pub retrieval_ttl: Duration,

    /// L3 time-to-live
    #[serde(default = "default_partial_ttl", with = "humantime_serde")]
    pub partial_ttl: Duration,

    /// L2 query text is truncated to this many characters
    #[serde(default = "default_query_max_chars")]
    pub query_max_chars: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            full_result_ttl: default_full_result_ttl(),
            retrieval_ttl: default_retrieval_ttl(),
            partial_ttl: default_partial_ttl(),
            query_max_chars: default_query_max_chars(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Applies to every dependency without an override
    #[serde(flatten)]
    pub defaults: BreakerConfig,

    /// Per-dependency settings keyed by breaker name
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overrides: HashMap<String, BreakerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Deadline for one agent attempt
    #[serde(default = "default_agent_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// A processing job whose last heartbeat is older than this may be
    /// picked up again by another `process` call
    #[serde(default = "default_stale_after", with = "humantime_serde")]
    pub stale_after: Duration,

    /// Relative share of overall progress per agent; missing agents weigh 1
    #[serde(default)]
    pub progress_weights: BTreeMap<AgentKind, u32>,

    #[serde(default)]
    pub designer_split: SplitConfig,

    /// Fall back to the template installer when the generated one fails
    #[serde(default = "default_true")]
    pub installer_fallback: bool,

    /// Retrieved facets included in each prompt
    #[serde(default = "default_max_context_facets")]
    pub max_context_facets: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            timeout: default_agent_timeout(),
            stale_after: default_stale_after(),
            progress_weights: BTreeMap::new(),
            designer_split: SplitConfig::default(),
            installer_fallback: true,
            max_context_facets: default_max_context_facets(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Split only inputs with more circuits than this
    #[serde(default = "default_split_threshold")]
    pub threshold: usize,

    #[serde(default = "default_max_split_depth")]
    pub max_split_depth: u32,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: default_split_threshold(),
            max_split_depth: default_max_split_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// JSON knowledge file loaded into the in-memory index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub knowledge_path: Option<PathBuf>,

    #[serde(default = "default_sources")]
    pub sources: Vec<KnowledgeSource>,

    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// Fail the job when retrieval finds nothing
    #[serde(default)]
    pub require_results: bool,

    /// Log a warning below this many fused results
    #[serde(default = "default_min_results_warning")]
    pub min_results_warning: usize,

    #[serde(default = "default_retrieval_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            knowledge_path: None,
            sources: default_sources(),
            max_keywords: default_max_keywords(),
            rrf_k: default_rrf_k(),
            result_limit: default_result_limit(),
            require_results: false,
            min_results_warning: default_min_results_warning(),
            timeout: default_retrieval_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// "openai" or "openai-compatible"
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_secret() -> String {
    "sparkplan-development-secret".to_string()
}

fn default_full_result_ttl() -> Duration {
    Duration::from_secs(30 * DAY)
}

fn default_retrieval_ttl() -> Duration {
    Duration::from_secs(7 * DAY)
}

fn default_partial_ttl() -> Duration {
    Duration::from_secs(30 * DAY)
}

fn default_query_max_chars() -> usize {
    DEFAULT_QUERY_MAX_CHARS
}

fn default_agent_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_stale_after() -> Duration {
    Duration::from_secs(600)
}

fn default_max_context_facets() -> usize {
    12
}

fn default_split_threshold() -> usize {
    5
}

fn default_max_split_depth() -> u32 {
    2
}

fn default_sources() -> Vec<KnowledgeSource> {
    vec![
        KnowledgeSource::new("regulations", 0.85),
        KnowledgeSource::new("practical_work", 0.95),
        KnowledgeSource::new("health_safety", 0.90),
    ]
}

fn default_max_keywords() -> usize {
    DEFAULT_MAX_KEYWORDS
}

fn default_rrf_k() -> u32 {
    DEFAULT_RRF_K
}

fn default_result_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_min_results_warning() -> usize {
    5
}

fn default_retrieval_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_provider_type() -> String {
    "openai-compatible".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_connections() -> u32 {
    5
}

impl Default for OrchestratorConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "sparkplan".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: OrchestratorConfigSpec::default(),
        }
    }
}

/// Resolve "env:VAR_NAME" indirection; plain values pass through.
pub fn resolve_secret_ref(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var_name) => std::env::var(var_name)
            .map_err(|_| anyhow::anyhow!("Environment variable not set: {}", var_name)),
        None => Ok(value.to_string()),
    }
}

impl OrchestratorConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        std::fs::write(path, self.to_yaml_string()?)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. SPARKPLAN_CONFIG_PATH environment variable
    /// 2. ./sparkplan-config.yaml (working directory)
    /// 3. ~/.sparkplan/config.yaml (user home)
    /// 4. /etc/sparkplan/config.yaml (system, Unix) or C:\ProgramData\Sparkplan\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sparkplan-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sparkplan").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/sparkplan/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Sparkplan\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("SPARKPLAN_CACHE_SECRET") {
            if !secret.is_empty() {
                tracing::info!("Environment override: SPARKPLAN_CACHE_SECRET");
                self.spec.cache.secret = secret;
            }
        }

        if let Ok(url) = std::env::var("SPARKPLAN_DATABASE_URL") {
            tracing::info!("Environment override: SPARKPLAN_DATABASE_URL");
            match self.spec.database.as_mut() {
                Some(database) => database.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(val) = std::env::var("SPARKPLAN_BREAKER_THRESHOLD") {
            match val.parse::<u32>() {
                Ok(threshold) if threshold > 0 => {
                    tracing::info!("Environment override: SPARKPLAN_BREAKER_THRESHOLD={}", threshold);
                    self.spec.breaker.defaults.threshold = threshold;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for SPARKPLAN_BREAKER_THRESHOLD: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Cache secret with "env:" indirection resolved
    pub fn cache_secret(&self) -> anyhow::Result<String> {
        resolve_secret_ref(&self.spec.cache.secret)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.cache.secret.trim().is_empty() {
            anyhow::bail!("spec.cache.secret cannot be empty");
        }

        if self.spec.cache.query_max_chars == 0 {
            anyhow::bail!("spec.cache.query_max_chars must be positive");
        }

        let breakers = std::iter::once(("default", &self.spec.breaker.defaults)).chain(
            self.spec
                .breaker
                .overrides
                .iter()
                .map(|(name, config)| (name.as_str(), config)),
        );
        for (name, config) in breakers {
            if config.threshold == 0 {
                anyhow::bail!("Breaker threshold must be positive for: {}", name);
            }
        }

        if self.spec.retry.max_attempts == 0 {
            anyhow::bail!("spec.retry.max_attempts must be at least 1");
        }

        if self.spec.retry.multiplier < 1.0 {
            anyhow::bail!("spec.retry.multiplier must be >= 1.0");
        }

        if self.spec.agents.timeout.is_zero() {
            anyhow::bail!("spec.agents.timeout must be positive");
        }

        if self.spec.agents.progress_weights.values().all(|w| *w == 0)
            && !self.spec.agents.progress_weights.is_empty()
        {
            anyhow::bail!("spec.agents.progress_weights cannot all be zero");
        }

        if self.spec.retrieval.sources.is_empty() {
            anyhow::bail!("spec.retrieval.sources must list at least one knowledge base");
        }

        for source in &self.spec.retrieval.sources {
            if source.knowledge_base.is_empty() {
                anyhow::bail!("Knowledge source name cannot be empty");
            }
            if !(source.weight.is_finite() && source.weight > 0.0) {
                anyhow::bail!(
                    "Knowledge source '{}' must have a positive weight",
                    source.knowledge_base
                );
            }
        }

        if let Some(completion) = &self.spec.completion {
            match completion.provider_type.as_str() {
                "openai" | "openai-compatible" => {}
                other => anyhow::bail!("Unsupported completion provider type: {}", other),
            }
            if completion.endpoint.is_empty() {
                anyhow::bail!("spec.completion.endpoint cannot be empty");
            }
            if completion.model.is_empty() {
                anyhow::bail!("spec.completion.model cannot be empty");
            }
        }

        if let Some(database) = &self.spec.database {
            if database.url.is_empty() {
                anyhow::bail!("spec.database.url cannot be empty");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = OrchestratorConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert_eq!(manifest.spec.breaker.defaults.threshold, 5);
        assert_eq!(manifest.spec.cache.full_result_ttl, Duration::from_secs(30 * DAY));
        assert_eq!(manifest.spec.cache.retrieval_ttl, Duration::from_secs(7 * DAY));
        assert_eq!(manifest.spec.retrieval.sources.len(), 3);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_parse_humantime_and_overrides() {
        let yaml = r#"
apiVersion: sparkplan.dev/v1
kind: OrchestratorConfig
metadata:
  name: test
spec:
  cache:
    secret: abc
    retrieval_ttl: 3days
  breaker:
    threshold: 3
    reset_timeout: 30s
    overrides:
      completion:
        threshold: 8
        reset_timeout: 2m
  retry:
    max_attempts: 4
    backoff: 250ms
    multiplier: 1.5
  agents:
    timeout: 90s
    progress_weights:
      designer: 2
      installer: 1
  retrieval:
    sources:
      - knowledge_base: regulations
        weight: 0.85
"#;
        let manifest = OrchestratorConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.cache.retrieval_ttl, Duration::from_secs(3 * DAY));
        assert_eq!(manifest.spec.breaker.defaults.threshold, 3);
        assert_eq!(
            manifest.spec.breaker.overrides["completion"].reset_timeout,
            Duration::from_secs(120)
        );
        assert_eq!(manifest.spec.retry.backoff, Duration::from_millis(250));
        assert_eq!(manifest.spec.agents.progress_weights[&AgentKind::Designer], 2);
        assert_eq!(manifest.spec.retrieval.sources[0].limit, DEFAULT_SEARCH_LIMIT);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut manifest = OrchestratorConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.spec.cache.secret = "  ".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.cache.secret = "abc".to_string();

        manifest.spec.retry.max_attempts = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.retry.max_attempts = 3;

        manifest.spec.retrieval.sources[0].weight = 0.0;
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_yaml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sparkplan-config.yaml");
        let mut manifest = OrchestratorConfigManifest::default();
        manifest.metadata.name = "site-a".to_string();
        manifest.to_yaml_file(&path).unwrap();

        let loaded = OrchestratorConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "site-a");
    }

    #[test]
    fn test_secret_reference_resolution() {
        assert_eq!(resolve_secret_ref("plain").unwrap(), "plain");
        assert!(resolve_secret_ref("env:SPARKPLAN_TEST_SURELY_UNSET_VAR").is_err());
    }
}
