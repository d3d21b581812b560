//! Configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_EMBEDDING__API_KEY`). Provides helpers to expand `~` and `${VAR}` and
//! to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.validate_for_env(&env_name)?;
        Ok(config)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Typed view of every section, with defaults for anything unset.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
        settings.chunking.validate()?;
        Ok(settings)
    }

    fn validate_for_env(&self, env: &str) -> anyhow::Result<()> {
        match env {
            "prod" | "production" => {
                let provider: EmbeddingProvider = self.get("embedding.provider")?;
                if provider == EmbeddingProvider::Fake {
                    anyhow::bail!("embedding.provider = \"fake\" is not allowed in production");
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub rules: RulesConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding parsed-document JSON records.
    pub parsed_dir: String,
    /// Location of the persisted index artifact.
    pub index_path: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { parsed_dir: "data/parsed".to_string(), index_path: "data/index/regulations.zrix".to_string() }
    }
}

impl DataConfig {
    pub fn parsed_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.parsed_dir)
    }

    pub fn index_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index_path)
    }
}

/// Token budget for chunking.
///
/// `max_tokens == target_tokens`; `min_tokens == target_tokens - lookback_tokens`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub target_tokens: usize,
    pub overlap_tokens: usize,
    /// How far back from the hard cut to look for a sentence or line break.
    pub lookback_tokens: usize,
    /// Zoning codes used to tag chunks of documents that carry no zoning label.
    pub zoning_codes: Vec<String>,
    /// Optional HuggingFace `tokenizer.json`; word tokenization otherwise.
    pub tokenizer_path: Option<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { target_tokens: 700, overlap_tokens: 100, lookback_tokens: 100, zoning_codes: Vec::new(), tokenizer_path: None }
    }
}

impl ChunkingConfig {
    /// Budget with a lookback window of one seventh of the target.
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        Self { target_tokens, overlap_tokens, lookback_tokens: target_tokens / 7, ..Self::default() }
    }

    pub fn max_tokens(&self) -> usize {
        self.target_tokens
    }

    pub fn min_tokens(&self) -> usize {
        self.target_tokens.saturating_sub(self.lookback_tokens)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.target_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.target_tokens must be > 0".into()));
        }
        if self.lookback_tokens >= self.target_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.lookback_tokens ({}) must be < target_tokens ({})",
                self.lookback_tokens, self.target_tokens
            )));
        }
        if self.overlap_tokens >= self.min_tokens() {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_tokens ({}) must be < min_tokens ({})",
                self.overlap_tokens,
                self.min_tokens()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Gemini,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Requested output dimensionality; service default when unset.
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub request_timeout_ms: u64,
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Gemini,
            model: "gemini-embedding-001".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            dimensions: None,
            batch_size: 32,
            request_timeout_ms: 30_000,
            retry: RetryConfig::default(),
        }
    }
}

impl EmbeddingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fractional jitter in `[0, 1)`, applied symmetrically.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay_ms: 500, max_delay_ms: 16_000, jitter: 0.2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub query_timeout_ms: u64,
    /// Hits fetched per citation topic during rule evaluation.
    pub citation_k: usize,
    /// Let chunks without a zoning label match a zoning-scoped query.
    pub include_unzoned: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 8, query_timeout_ms: 20_000, citation_k: 4, include_unzoned: true }
    }
}

impl RetrievalConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// TOML rule table; built-in SB9/ADU rules when unset.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            timeout_ms: 60_000,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
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

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
