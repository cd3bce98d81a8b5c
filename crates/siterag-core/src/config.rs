use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub use crate::chunker::ChunkingConfig;
use crate::error::{Error, Result};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::new().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        // APP_RETRIEVAL__DEFAULT_TOP_K=10 -> retrieval.default_top_k
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    /// Wrap caller-supplied providers. No files or environment are read.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment, env_name: "custom".to_string() }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// All typed sections, with defaults for anything not configured.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(self.figment.clone())
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        match self.env_name.as_str() {
            "prod" | "production" if settings.embedding.use_fake => {
                anyhow::bail!("embedding.use_fake is not allowed in production")
            }
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub data: DataConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.retrieval.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Candidates requested per strategy, as a multiple of `top_k`.
    pub candidate_multiplier: usize,
    pub max_candidates: usize,
    pub lexical_weight: f32,
    pub vector_weight: f32,
    pub strategy_timeout_ms: u64,
    /// Display truncation for returned chunk text; 0 disables it.
    pub max_content_chars: usize,
    pub rerank: RerankConfig,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: crate::types::DEFAULT_TOP_K,
            max_top_k: 100,
            candidate_multiplier: 4,
            max_candidates: 50,
            lexical_weight: 0.4,
            vector_weight: 0.6,
            strategy_timeout_ms: 5_000,
            max_content_chars: 2_000,
            rerank: RerankConfig::default(),
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_top_k == 0 || self.default_top_k == 0 || self.default_top_k > self.max_top_k {
            return Err(Error::InvalidConfig(format!(
                "retrieval.default_top_k ({}) must be within 1..={}",
                self.default_top_k, self.max_top_k
            )));
        }
        if self.candidate_multiplier == 0 || self.max_candidates == 0 {
            return Err(Error::InvalidConfig(
                "retrieval.candidate_multiplier and retrieval.max_candidates must be > 0".to_string(),
            ));
        }
        let weights_ok = self.lexical_weight >= 0.0 && self.vector_weight >= 0.0;
        if !weights_ok || self.lexical_weight + self.vector_weight <= 0.0 {
            return Err(Error::InvalidConfig("retrieval weights must be non-negative and not both zero".to_string()));
        }
        if self.strategy_timeout_ms == 0 {
            return Err(Error::InvalidConfig("retrieval.strategy_timeout_ms must be > 0".to_string()));
        }
        self.rerank.validate()
    }

    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    /// How many candidates each strategy is asked for when the caller
    /// wants `top_k` results.
    pub fn candidates_for(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.candidate_multiplier).min(self.max_candidates).max(top_k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankConfig {
    pub enabled: bool,
    pub max_candidates: usize,
    /// Weight of the reranker score against the fused score, in [0, 1].
    pub blend_weight: f32,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { enabled: false, max_candidates: 50, blend_weight: 0.5 }
    }
}

impl RerankConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.blend_weight) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.rerank.blend_weight must be in [0, 1], got {}",
                self.blend_weight
            )));
        }
        if self.max_candidates == 0 {
            return Err(Error::InvalidConfig("retrieval.rerank.max_candidates must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Longer inputs are truncated before embedding.
    pub max_chars: usize,
    pub cache_capacity: usize,
    pub use_fake: bool,
    pub model_dir: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { max_chars: 8_000, cache_capacity: 4_096, use_fake: false, model_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub index_dir: String,
    pub lancedb_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { index_dir: "~/.siterag/index".to_string(), lancedb_dir: "~/.siterag/lancedb".to_string() }
    }
}

impl DataConfig {
    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index_dir)
    }

    pub fn lancedb_path(&self) -> PathBuf {
        expand_path(&self.lancedb_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
