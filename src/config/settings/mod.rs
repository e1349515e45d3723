
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::vector::relevance::RelevanceFn;
use crate::vector::{DEFAULT_MAX_RESULTS, DEFAULT_SCORE_THRESHOLD, SearchOptions};

pub const API_KEY_ENV: &str = "SALES_RETRIEVAL_API_KEY";
pub const LEGACY_API_KEY_ENV: &str = "API2D_OPENAI_API_KEY";
pub const SOURCE_PATH_ENV: &str = "SALES_RETRIEVAL_SOURCE";

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CorpusConfig {
    /// Q&A corpus; the index artifact lives next to it
    pub source_path: PathBuf,
    /// Rebuild from the source when the persisted index cannot be read
    pub recover_corrupt: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("resources/electronic_devices_sales_qa.txt"),
            recover_corrupt: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub score_threshold: f32,
    pub max_results: usize,
    pub relevance: RelevanceFn,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            relevance: RelevanceFn::default(),
        }
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            threshold: self.score_threshold,
            limit: Some(self.max_results),
        }
    }
}

/// OpenAI-compatible completion endpoint used to phrase answers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_base: String,
    pub completion_path: String,
    pub chat_completion_path: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_base: "https://oa.api2d.net".to_string(),
            completion_path: "/v1/completions".to_string(),
            chat_completion_path: "/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_tokens: 256,
            timeout_secs: 60,
            api_key: None,
            stop: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 2 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid chunk size: {0} (must be between 1 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid chunk separator: {0}")]
    InvalidSeparator(String),
    #[error("Invalid score threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidScoreThreshold(f32),
    #[error("Invalid max results: {0} (must be at least 1)")]
    InvalidMaxResults(usize),
    #[error("Invalid relevance function: {0}")]
    InvalidRelevance(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid source path: {0} (an index artifact cannot be the corpus)")]
    InvalidSourcePath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory, `~/.sales-retrieval`
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".sales-retrieval"))
            .or_else(|| dirs::config_dir().map(|dir| dir.join("sales-retrieval")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load_from(config_dir)
    }

    /// Load `config.toml` from `config_dir`, falling back to defaults when absent.
    ///
    /// Environment overrides are applied before validation.
    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };
        config.base_dir = Some(config_dir.to_path_buf());
        config.apply_env_overrides();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir()?;
        fs::create_dir_all(&config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = config_dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Directory the configuration was loaded from, or the default one
    #[inline]
    pub fn get_base_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.base_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::config_dir(),
        }
    }

    #[inline]
    pub fn config_file_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.get_base_dir()?.join(CONFIG_FILE))
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    /// Apply overrides from the process environment
    #[inline]
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// `SALES_RETRIEVAL_API_KEY` wins over `API2D_OPENAI_API_KEY`; empty
    /// values are ignored.
    #[inline]
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(API_KEY_ENV).or_else(|| non_empty(LEGACY_API_KEY_ENV)) {
            self.generation.api_key = Some(key);
        }
        if let Some(source) = non_empty(SOURCE_PATH_ENV) {
            self.corpus.source_path = PathBuf::from(source);
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.corpus.validate()?;
        self.ollama.validate()?;
        self.validate_chunking_config()?;
        self.retrieval.validate()?;
        self.generation.validate()?;
        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if config.separator.is_empty() {
            return Err(ConfigError::InvalidSeparator(
                "separator cannot be empty".to_string(),
            ));
        }
        if config.is_regex {
            fancy_regex::Regex::new(&config.separator)
                .map_err(|e| ConfigError::InvalidSeparator(e.to_string()))?;
        }

        if !(1..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.chunk_overlap >= config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.chunk_overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }
}

impl CorpusConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let is_artifact = self
            .source_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("db"));
        if self.source_path.as_os_str().is_empty() || is_artifact {
            return Err(ConfigError::InvalidSourcePath(
                self.source_path.display().to_string(),
            ));
        }
        Ok(())
    }
}

impl RetrievalConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigError::InvalidScoreThreshold(self.score_threshold));
        }
        if self.max_results == 0 {
            return Err(ConfigError::InvalidMaxResults(self.max_results));
        }
        self.relevance
            .validate()
            .map_err(ConfigError::InvalidRelevance)
    }
}

impl GenerationConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.api_base).map_err(|_| ConfigError::InvalidUrl(self.api_base.clone()))?;

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        Ok(())
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}://{}:{}",
                self.protocol, self.host, self.port
            )));
        }
        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(2..=8192).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(2..=8192).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}
