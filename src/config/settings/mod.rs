
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::generation::{GroundingMode, Language};

pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2:1b";
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_HISTORY_TURNS: usize = 20;
pub const DEFAULT_GENERATION_TIMEOUT_SECONDS: u64 = 120;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: 0.7,
            timeout_seconds: 60,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory holding the pre-built index; defaults to `<config dir>/index`
    pub index_path: Option<PathBuf>,
    pub top_k: usize,
    /// Hits farther than this from the query are dropped before prompting
    pub max_distance: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: DEFAULT_TOP_K,
            max_distance: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AssistantConfig {
    pub language: Language,
    /// Number of most recent turns rendered into each prompt
    pub history_turns: usize,
    pub generation_timeout_seconds: u64,
    pub grounding: GroundingMode,
    pub not_found_phrase: Option<String>,
    /// Rewrite follow-up questions into standalone ones before retrieval
    pub condense_follow_ups: bool,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            history_turns: DEFAULT_HISTORY_TURNS,
            generation_timeout_seconds: DEFAULT_GENERATION_TIMEOUT_SECONDS,
            grounding: GroundingMode::default(),
            not_found_phrase: None,
            condense_follow_ups: false,
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
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid max distance: {0} (must be a positive number)")]
    InvalidMaxDistance(f32),
    #[error("Invalid history turns: {0} (must be between 0 and 200)")]
    InvalidHistoryTurns(usize),
    #[error("Invalid generation timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidGenerationTimeout(u64),
    #[error("Invalid not-found phrase (cannot be empty)")]
    InvalidNotFoundPhrase,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory (`~/.mindcare`)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Self::config_dir_from(dirs::home_dir())
    }

    /// Configuration directory for the given home directory
    #[inline]
    pub fn config_dir_from(home: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        home.map(|home| home.join(".mindcare"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("mindcare"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.retrieval.validate()?;
        self.assistant.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Directory of the pre-built vector index
    ///
    /// Relative `index_path` values are resolved against the base directory.
    #[inline]
    pub fn index_path(&self) -> PathBuf {
        match &self.retrieval.index_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.get_base_dir().join(path),
            None => self.get_base_dir().join("index"),
        }
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidTemperature(self.temperature));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
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

    pub fn set_temperature(&mut self, temperature: f32) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        self.temperature = temperature;
        Ok(())
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.top_k) {
            return Err(ConfigError::InvalidTopK(self.top_k));
        }

        if let Some(max_distance) = self.max_distance {
            if !max_distance.is_finite() || max_distance <= 0.0 {
                return Err(ConfigError::InvalidMaxDistance(max_distance));
            }
        }

        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) -> Result<(), ConfigError> {
        if !(1..=50).contains(&top_k) {
            return Err(ConfigError::InvalidTopK(top_k));
        }
        self.top_k = top_k;
        Ok(())
    }
}

impl AssistantConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_turns > 200 {
            return Err(ConfigError::InvalidHistoryTurns(self.history_turns));
        }

        if !(1..=3600).contains(&self.generation_timeout_seconds) {
            return Err(ConfigError::InvalidGenerationTimeout(
                self.generation_timeout_seconds,
            ));
        }

        if self
            .not_found_phrase
            .as_deref()
            .is_some_and(|phrase| phrase.trim().is_empty())
        {
            return Err(ConfigError::InvalidNotFoundPhrase);
        }

        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_seconds)
    }

    pub fn set_history_turns(&mut self, turns: usize) -> Result<(), ConfigError> {
        if turns > 200 {
            return Err(ConfigError::InvalidHistoryTurns(turns));
        }
        self.history_turns = turns;
        Ok(())
    }
}
