//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub discovery: DiscoveryConfig,
    pub query: QueryConfig,
    pub clustering: ClusteringConfig,
    pub insights: InsightConfig,
    pub evolution: EvolutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub similarity_threshold: f32,
    pub max_concurrency: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub default_limit: usize,
    pub default_max_depth: u32,
    pub path_anchor_count: usize,
    pub max_paths: usize,
    pub search_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    pub community_strength_threshold: f32,
    pub default_k: usize,
    pub topic_count: usize,
    pub min_topic_word_len: usize,
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub pattern_min_group: usize,
    pub pattern_k: usize,
    pub pattern_min_coherence: f32,
    pub gap_degree_threshold: usize,
    pub trend_window_days: u32,
    pub trend_min_entries: usize,
    pub ttl_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub retention_days: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "openai/text-embedding-3-small".to_string(),
            dimensions: None,
            timeout_secs: 30,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            max_concurrency: 8,
            timeout_ms: 10_000,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            default_max_depth: 3,
            path_anchor_count: 5,
            max_paths: 10,
            search_timeout_ms: 5_000,
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            community_strength_threshold: 0.5,
            default_k: 5,
            topic_count: 5,
            min_topic_word_len: 4,
            cache_ttl_secs: 3_600,
        }
    }
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            pattern_min_group: 3,
            pattern_k: 3,
            pattern_min_coherence: 0.7,
            gap_degree_threshold: 2,
            trend_window_days: 7,
            trend_min_entries: 10,
            ttl_days: 7,
        }
    }
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

impl EmbeddingConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("KNOWGRAPH_EMBEDDING_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "Embedding API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DiscoveryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl QueryConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

impl ClusteringConfig {
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs as i64)
    }
}

impl InsightConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.ttl_days as i64)
    }

    pub fn trend_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.trend_window_days as i64)
    }
}

impl EvolutionConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }
}

const KEYS: &[&str] = &[
    "embedding.base_url",
    "embedding.model",
    "embedding.dimensions",
    "embedding.timeout_secs",
    "discovery.similarity_threshold",
    "discovery.max_concurrency",
    "discovery.timeout_ms",
    "query.default_limit",
    "query.default_max_depth",
    "query.path_anchor_count",
    "query.max_paths",
    "query.search_timeout_ms",
    "clustering.community_strength_threshold",
    "clustering.default_k",
    "clustering.topic_count",
    "clustering.min_topic_word_len",
    "clustering.cache_ttl_secs",
    "insights.pattern_min_group",
    "insights.pattern_k",
    "insights.pattern_min_coherence",
    "insights.gap_degree_threshold",
    "insights.trend_window_days",
    "insights.trend_min_entries",
    "insights.ttl_days",
    "evolution.retention_days",
];

fn parse_unit(key: &str, value: &str) -> anyhow::Result<f32> {
    let parsed: f32 = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(anyhow!("{} must be between 0.0 and 1.0", key));
    }
    Ok(parsed)
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let parsed: T = value
        .parse()
        .with_context(|| format!("Invalid {} value: {}", key, value))?;
    if parsed <= T::default() {
        return Err(anyhow!("{} must be greater than zero", key));
    }
    Ok(parsed)
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("KNOWGRAPH_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("knowgraph")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or return defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.embedding.enforce_env_only()?;

        if !(0.0..=1.0).contains(&self.discovery.similarity_threshold) {
            return Err(anyhow!(
                "discovery.similarity_threshold must be between 0.0 and 1.0"
            ));
        }
        if !(0.0..=1.0).contains(&self.clustering.community_strength_threshold) {
            return Err(anyhow!(
                "clustering.community_strength_threshold must be between 0.0 and 1.0"
            ));
        }
        if self.discovery.max_concurrency == 0 {
            return Err(anyhow!("discovery.max_concurrency must be greater than zero"));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        let value = match key {
            "embedding.base_url" => self.embedding.base_url.clone(),
            "embedding.model" => self.embedding.model.clone(),
            "embedding.dimensions" => self
                .embedding
                .dimensions
                .map(|d| d.to_string())
                .unwrap_or_else(|| "(provider default)".to_string()),
            "embedding.timeout_secs" => self.embedding.timeout_secs.to_string(),

            "discovery.similarity_threshold" => self.discovery.similarity_threshold.to_string(),
            "discovery.max_concurrency" => self.discovery.max_concurrency.to_string(),
            "discovery.timeout_ms" => self.discovery.timeout_ms.to_string(),

            "query.default_limit" => self.query.default_limit.to_string(),
            "query.default_max_depth" => self.query.default_max_depth.to_string(),
            "query.path_anchor_count" => self.query.path_anchor_count.to_string(),
            "query.max_paths" => self.query.max_paths.to_string(),
            "query.search_timeout_ms" => self.query.search_timeout_ms.to_string(),

            "clustering.community_strength_threshold" => {
                self.clustering.community_strength_threshold.to_string()
            }
            "clustering.default_k" => self.clustering.default_k.to_string(),
            "clustering.topic_count" => self.clustering.topic_count.to_string(),
            "clustering.min_topic_word_len" => self.clustering.min_topic_word_len.to_string(),
            "clustering.cache_ttl_secs" => self.clustering.cache_ttl_secs.to_string(),

            "insights.pattern_min_group" => self.insights.pattern_min_group.to_string(),
            "insights.pattern_k" => self.insights.pattern_k.to_string(),
            "insights.pattern_min_coherence" => self.insights.pattern_min_coherence.to_string(),
            "insights.gap_degree_threshold" => self.insights.gap_degree_threshold.to_string(),
            "insights.trend_window_days" => self.insights.trend_window_days.to_string(),
            "insights.trend_min_entries" => self.insights.trend_min_entries.to_string(),
            "insights.ttl_days" => self.insights.ttl_days.to_string(),

            "evolution.retention_days" => self.evolution.retention_days.to_string(),

            "embedding.api_key" | "api_key" => {
                return Ok(match self.embedding.resolved_api_key()? {
                    Some(_) => "***".to_string(),
                    None => "(not set - use KNOWGRAPH_EMBEDDING_API_KEY env var)".to_string(),
                });
            }

            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        };
        Ok(value)
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "embedding.base_url" => {
                let trimmed = value.trim_end_matches('/');
                if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
                    return Err(anyhow!("embedding.base_url must be an http(s) URL"));
                }
                self.embedding.base_url = trimmed.to_string();
            }
            "embedding.model" => self.embedding.model = value.to_string(),
            "embedding.dimensions" => {
                self.embedding.dimensions = Some(parse_positive(key, value)?);
            }
            "embedding.timeout_secs" => self.embedding.timeout_secs = parse_positive(key, value)?,

            "discovery.similarity_threshold" => {
                self.discovery.similarity_threshold = parse_unit(key, value)?;
            }
            "discovery.max_concurrency" => {
                self.discovery.max_concurrency = parse_positive(key, value)?;
            }
            "discovery.timeout_ms" => self.discovery.timeout_ms = parse_positive(key, value)?,

            "query.default_limit" => self.query.default_limit = parse_positive(key, value)?,
            "query.default_max_depth" => {
                self.query.default_max_depth = parse_positive(key, value)?;
            }
            "query.path_anchor_count" => {
                self.query.path_anchor_count = parse_positive(key, value)?;
            }
            "query.max_paths" => self.query.max_paths = parse_positive(key, value)?,
            "query.search_timeout_ms" => {
                self.query.search_timeout_ms = parse_positive(key, value)?;
            }

            "clustering.community_strength_threshold" => {
                self.clustering.community_strength_threshold = parse_unit(key, value)?;
            }
            "clustering.default_k" => self.clustering.default_k = parse_positive(key, value)?,
            "clustering.topic_count" => self.clustering.topic_count = parse_positive(key, value)?,
            "clustering.min_topic_word_len" => {
                self.clustering.min_topic_word_len = parse_positive(key, value)?;
            }
            "clustering.cache_ttl_secs" => {
                self.clustering.cache_ttl_secs = parse_positive(key, value)?;
            }

            "insights.pattern_min_group" => {
                self.insights.pattern_min_group = parse_positive(key, value)?;
            }
            "insights.pattern_k" => self.insights.pattern_k = parse_positive(key, value)?,
            "insights.pattern_min_coherence" => {
                self.insights.pattern_min_coherence = parse_unit(key, value)?;
            }
            "insights.gap_degree_threshold" => {
                self.insights.gap_degree_threshold = parse_positive(key, value)?;
            }
            "insights.trend_window_days" => {
                self.insights.trend_window_days = parse_positive(key, value)?;
            }
            "insights.trend_min_entries" => {
                self.insights.trend_min_entries = parse_positive(key, value)?;
            }
            "insights.ttl_days" => self.insights.ttl_days = parse_positive(key, value)?,

            "evolution.retention_days" => {
                self.evolution.retention_days = parse_positive(key, value)?;
            }

            "embedding.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration. \
                     Set the KNOWGRAPH_EMBEDDING_API_KEY environment variable instead."
                ));
            }

            _ => return Err(anyhow!("Unknown configuration key: {}", key)),
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.discovery.similarity_threshold, 0.7);
        assert_eq!(config.query.max_paths, 10);
        assert_eq!(config.query.path_anchor_count, 5);
        assert_eq!(config.clustering.topic_count, 5);
        assert_eq!(config.insights.ttl_days, 7);
        assert_eq!(config.evolution.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();

        config.set("discovery.similarity_threshold", "0.85").unwrap();
        assert_eq!(config.get("discovery.similarity_threshold").unwrap(), "0.85");

        config.set("query.default_limit", "25").unwrap();
        assert_eq!(config.query.default_limit, 25);

        assert!(config.set("discovery.similarity_threshold", "1.5").is_err());
        assert!(config.set("query.default_limit", "0").is_err());
        assert!(config.set("query.default_limit", "many").is_err());
        assert!(config.set("embedding.api_key", "secret").is_err());
        assert!(config.set("nope", "1").is_err());
        assert!(config.get("nope").is_err());
    }

    #[test]
    fn test_list_covers_all_keys() {
        let config = Config::default();
        let listed = config.list().unwrap();
        assert_eq!(listed.len(), KEYS.len());
        assert!(listed.iter().any(|(k, _)| k == "evolution.retention_days"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("clustering.default_k", "7").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.clustering.default_k, 7);
        assert_eq!(loaded.discovery.similarity_threshold, 0.7);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[query]\ndefault_limit = 3\n").unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.query.default_limit, 3);
        assert_eq!(loaded.query.max_paths, 10);
        assert_eq!(loaded.insights.pattern_k, 3);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded.query.default_max_depth, 3);
    }
}
