
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::database::Metric;
use crate::embeddings::openai::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL};
use crate::http::DEFAULT_TIMEOUT_SECONDS;
use crate::retrieval::{DEFAULT_RELEVANCE_THRESHOLD, DEFAULT_TOP_K};

pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const PINECONE_API_KEY_VAR: &str = "PINECONE_API_KEY";
pub const PINECONE_ENVIRONMENT_VAR: &str = "PINECONE_ENVIRONMENT";
pub const PINECONE_INDEX_NAME_VAR: &str = "PINECONE_INDEX_NAME";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: usize,
    pub timeout_seconds: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: "gpt-4".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Serverless region new indexes are created in
    pub environment: String,
    pub cloud: String,
    pub index_name: String,
    pub control_url: String,
    /// Data-plane host; resolved from the control plane when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,
    pub metric: Metric,
    pub upsert_batch_size: usize,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            environment: "us-east-1".to_string(),
            cloud: "aws".to_string(),
            index_name: "rag-documents".to_string(),
            control_url: "https://api.pinecone.io".to_string(),
            index_host: None,
            metric: Metric::Cosine,
            upsert_batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub relevance_threshold: f64,
    pub max_tool_rounds: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
            max_tool_rounds: crate::agent::DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 20000)")]
    InvalidEmbeddingDimension(usize),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error(
        "Invalid index name: {0} (lowercase letters, digits and '-' only, at most 45 characters)"
    )]
    InvalidIndexName(String),
    #[error("Invalid region: {0} (cannot be empty)")]
    InvalidRegion(String),
    #[error("Invalid upsert batch size: {0} (must be between 1 and 1000)")]
    InvalidUpsertBatchSize(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid relevance threshold: {0} (must be between 0 and 1)")]
    InvalidRelevanceThreshold(f64),
    #[error("Invalid max tool rounds: {0} (must be between 1 and 20)")]
    InvalidMaxToolRounds(usize),
    #[error("Missing API key: set {0} or add it to the config file")]
    MissingApiKey(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".rag-agent"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("rag-agent"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load the config file (or defaults) and apply environment overrides
    #[inline]
    pub fn load() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        let mut config = Self::load_from(&config_dir)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config
            .validate()
            .context("Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    /// Load `config.toml` from `config_dir` without consulting the environment
    #[inline]
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        self.save_to(&config_dir)
    }

    #[inline]
    pub fn save_to<P: AsRef<Path>>(&self, config_dir: P) -> Result<PathBuf> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = config_dir.as_ref();
        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = config_dir.join("config.toml");
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(config_path)
    }

    /// Apply the four process-level settings on top of the file contents.
    ///
    /// Empty values are ignored so an exported-but-blank variable does not
    /// wipe a key stored in the file.
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = value(OPENAI_API_KEY_VAR) {
            self.openai.api_key = key;
        }
        if let Some(key) = value(PINECONE_API_KEY_VAR) {
            self.pinecone.api_key = key;
        }
        if let Some(environment) = value(PINECONE_ENVIRONMENT_VAR) {
            self.pinecone.environment = environment;
        }
        if let Some(index_name) = value(PINECONE_INDEX_NAME_VAR) {
            self.pinecone.index_name = index_name;
        }
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.pinecone.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    /// Check that both API keys are present before talking to any service
    #[inline]
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.openai.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(OPENAI_API_KEY_VAR));
        }
        if self.pinecone.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey(PINECONE_API_KEY_VAR));
        }
        Ok(())
    }
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(1..=20_000).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.base_url)
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }
}

impl PineconeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control_url()?;
        validate_index_name(&self.index_name)?;

        if self.environment.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(self.environment.clone()));
        }

        if !(1..=1000).contains(&self.upsert_batch_size) {
            return Err(ConfigError::InvalidUpsertBatchSize(self.upsert_batch_size));
        }

        Ok(())
    }

    pub fn control_url(&self) -> Result<Url, ConfigError> {
        parse_http_url(&self.control_url)
    }

    pub fn set_index_name(&mut self, index_name: String) -> Result<(), ConfigError> {
        validate_index_name(&index_name)?;
        self.index_name = index_name;
        Ok(())
    }

    pub fn set_environment(&mut self, environment: String) -> Result<(), ConfigError> {
        if environment.trim().is_empty() {
            return Err(ConfigError::InvalidRegion(environment));
        }
        self.environment = environment;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if !(0.0..=1.0).contains(&self.relevance_threshold) {
            return Err(ConfigError::InvalidRelevanceThreshold(
                self.relevance_threshold,
            ));
        }

        if !(1..=20).contains(&self.max_tool_rounds) {
            return Err(ConfigError::InvalidMaxToolRounds(self.max_tool_rounds));
        }

        Ok(())
    }
}

fn parse_http_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    let valid = !name.is_empty()
        && name.len() <= 45
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIndexName(name.to_string()))
    }
}
