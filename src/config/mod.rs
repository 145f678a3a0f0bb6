// Configuration management module
// TOML settings for the Ollama providers, retrieval and the assistant itself

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{AssistantConfig, Config, ConfigError, OllamaConfig, RetrievalConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
