
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;
use std::time::Duration;

use super::{AssistantConfig, Config, ConfigError, OllamaConfig, RetrievalConfig};
use crate::generation::{GroundingMode, Language};
use crate::providers::OllamaClient;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 MindCare Assistant Configuration").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the local Ollama instance used for embeddings and answers.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;

    eprintln!();
    eprintln!("{}", style("Assistant").bold().yellow());
    configure_assistant(&mut config.assistant)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama) {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before chatting.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config: &Config) {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Chat Model: {}", style(&config.ollama.chat_model).cyan());
    eprintln!("  Temperature: {}", style(config.ollama.temperature).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Retrieval Settings:").bold().yellow());
    eprintln!(
        "  Index Path: {}",
        style(config.index_path().display()).cyan()
    );
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());
    match config.retrieval.max_distance {
        Some(max_distance) => eprintln!("  Max Distance: {}", style(max_distance).cyan()),
        None => eprintln!("  Max Distance: {}", style("none").dim()),
    }

    eprintln!();
    eprintln!("{}", style("Assistant Settings:").bold().yellow());
    eprintln!("  Language: {}", style(config.assistant.language).cyan());
    eprintln!(
        "  History Turns: {}",
        style(config.assistant.history_turns).cyan()
    );
    eprintln!(
        "  Generation Timeout: {}s",
        style(config.assistant.generation_timeout_seconds).cyan()
    );
    eprintln!("  Grounding: {}", style(config.assistant.grounding).cyan());
    eprintln!(
        "  Condense Follow-ups: {}",
        style(config.assistant.condense_follow_ups).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Config::with_base_dir(config_dir)
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_model: String = Input::new()
        .with_prompt("Embedding model (must match the one used to build the index)")
        .default(ollama.embedding_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let chat_model: String = Input::new()
        .with_prompt("Chat model")
        .default(ollama.chat_model.clone())
        .validate_with(non_empty)
        .interact_text()?;

    let temperature: f32 = Input::new()
        .with_prompt("Sampling temperature")
        .default(ollama.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0.0 and 2.0")
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_embedding_model(embedding_model)?;
    ollama.set_chat_model(chat_model)?;
    ollama.set_temperature(temperature)?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    let top_k: usize = Input::new()
        .with_prompt("Documents retrieved per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=50).contains(input) {
                Ok(())
            } else {
                Err("Must be between 1 and 50")
            }
        })
        .interact_text()?;

    retrieval.set_top_k(top_k)?;
    Ok(())
}

fn configure_assistant(assistant: &mut AssistantConfig) -> Result<()> {
    let languages = [Language::French, Language::English, Language::Arabic];
    let default_index = languages
        .iter()
        .position(|&l| l == assistant.language)
        .unwrap_or(0);

    let language_index = Select::new()
        .with_prompt("Answer language")
        .default(default_index)
        .items(&languages.map(|l| l.display_name()))
        .interact()?;

    let modes = [GroundingMode::Advisory, GroundingMode::Strict];
    let mode_index = Select::new()
        .with_prompt("Grounding (strict refuses answers unrelated to the documents)")
        .default(usize::from(assistant.grounding == GroundingMode::Strict))
        .items(&modes.map(|m| m.to_string()))
        .interact()?;

    let history_turns: usize = Input::new()
        .with_prompt("Conversation turns included in each prompt")
        .default(assistant.history_turns)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input <= 200 {
                Ok(())
            } else {
                Err("Must be 200 or less")
            }
        })
        .interact_text()?;

    let condense_follow_ups = Confirm::new()
        .with_prompt("Rewrite follow-up questions before searching the documents?")
        .default(assistant.condense_follow_ups)
        .interact()?;

    assistant.language = languages[language_index];
    assistant.grounding = modes[mode_index];
    assistant.set_history_turns(history_turns)?;
    assistant.condense_follow_ups = condense_follow_ups;
    Ok(())
}

fn non_empty(input: &String) -> Result<(), &'static str> {
    if input.trim().is_empty() {
        Err("Model name cannot be empty")
    } else {
        Ok(())
    }
}

fn test_ollama_connection(ollama: &OllamaConfig) -> bool {
    OllamaClient::new(ollama)
        .map(|client| {
            client
                .with_timeout(Duration::from_secs(5))
                .with_retry_attempts(1)
        })
        .and_then(|client| client.ping())
        .is_ok()
}
