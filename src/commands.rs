use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::ErrorKind;
use crate::generation::Language;
use crate::index::{IndexManifest, IndexStore, LanceIndex};
use crate::providers::OllamaClient;
use crate::{Assistant, AssistantError, ChatSession};

const QUIT_COMMAND: &str = "/quit";

/// Answer a single question and print the answer on stdout
pub async fn ask_question(config: &Config, question: &str, language: Option<Language>) -> Result<()> {
    let language = language.unwrap_or(config.assistant.language);

    let mut session = match Assistant::initialize(config).await {
        Ok(assistant) => assistant.session().with_language(language),
        Err(e) => {
            report_failure(&e, language);
            return Err(e).context("Failed to initialize the assistant");
        }
    };

    match ask_with_spinner(&mut session, question).await {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(e) => {
            report_failure(&e, language);
            Err(e).context("Failed to answer the question")
        }
    }
}

/// Interactive chat on the terminal
///
/// A failed question is offered again as the initial text of the next
/// prompt so the user can retry without retyping it.
pub async fn run_chat(config: &Config, language: Option<Language>) -> Result<()> {
    let language = language.unwrap_or(config.assistant.language);

    let assistant = match Assistant::initialize(config).await {
        Ok(assistant) => assistant,
        Err(e) => {
            report_failure(&e, language);
            return Err(e).context("Failed to initialize the assistant");
        }
    };
    let mut session = assistant.session().with_language(language);
    info!("Started chat session {}", session.id());

    println!("{}", style(greeting(language)).bold().cyan());
    println!("{}", style(quit_hint(language)).dim());
    println!();

    let mut pending = String::new();
    loop {
        let input = match Input::<String>::new()
            .with_prompt(prompt_label(language))
            .with_initial_text(std::mem::take(&mut pending))
            .allow_empty(true)
            .interact_text()
        {
            Ok(input) => input,
            Err(e) => {
                // end of input or a closed terminal ends the conversation
                warn!("Input closed: {}", e);
                break;
            }
        };

        if input.trim() == QUIT_COMMAND {
            break;
        }

        match ask_with_spinner(&mut session, &input).await {
            Ok(answer) => {
                println!("{} {}", style(assistant_label(language)).green().bold(), answer);
                println!();
            }
            Err(e) => {
                report_failure(&e, language);
                if e.kind() != ErrorKind::InvalidInput {
                    pending = input;
                }
            }
        }
    }

    info!(
        "Chat session {} ended after {} turns",
        session.id(),
        session.memory().len()
    );
    Ok(())
}

/// Print configuration, index and Ollama health
pub async fn show_status(config: &Config) -> Result<()> {
    println!("📊 MindCare Assistant Status");
    println!("{}", "=".repeat(50));
    println!();

    println!("⚙️  Configuration:");
    println!("   File: {}", config.config_file_path().display());
    println!("   Language: {}", config.assistant.language.display_name());
    println!("   Grounding: {}", config.assistant.grounding);
    println!(
        "   Condense follow-ups: {}",
        config.assistant.condense_follow_ups
    );
    match config.validate() {
        Ok(()) => println!("   ✅ Valid"),
        Err(e) => println!("   ❌ Invalid - {}", e),
    }
    println!();

    let index_path = config.index_path();
    println!("🔍 Index Status:");
    println!("   Path: {}", index_path.display());
    match IndexManifest::read(&index_path) {
        Ok(manifest) => {
            println!("   📋 Embedding model: {}", manifest.embedding_model);
            println!("   🔢 Dimension: {} ({})", manifest.dimension, manifest.metric);
            println!(
                "   🕒 Built: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S")
            );

            match manifest.ensure_compatible(&config.ollama.embedding_model) {
                Ok(()) => println!("   ✅ Matches the configured embedding model"),
                Err(e) => println!("   ❌ {}", e),
            }

            match LanceIndex::open(&index_path).await {
                Ok(index) => match index.count().await {
                    Ok(count) => println!("   ✅ LanceDB: {} documents", count),
                    Err(e) => println!("   ⚠️  LanceDB: Opened but unreadable - {}", e),
                },
                Err(e) => println!("   ❌ LanceDB: {}", e),
            }
        }
        Err(e) => println!("   ❌ {}", e),
    }
    println!();

    println!("🤖 Ollama Status:");
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let models = [
                config.ollama.embedding_model.clone(),
                config.ollama.chat_model.clone(),
            ];
            let health = tokio::task::spawn_blocking(move || {
                let models: Vec<&str> = models.iter().map(String::as_str).collect();
                client.health_check(&models)
            })
            .await
            .context("Ollama health check task failed")?;

            match health {
                Ok(()) => {
                    println!(
                        "   ✅ Ollama: Connected ({}:{})",
                        config.ollama.host, config.ollama.port
                    );
                    println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                    println!("   💬 Chat model: {}", config.ollama.chat_model);
                }
                Err(e) => println!("   ⚠️  Ollama: Unhealthy - {}", e),
            }
        }
        Err(e) => println!("   ❌ Ollama: {}", e),
    }

    Ok(())
}

async fn ask_with_spinner(
    session: &mut ChatSession,
    question: &str,
) -> std::result::Result<String, AssistantError> {
    let spinner = thinking_spinner(session.language());
    let result = session.ask(question).await;
    spinner.finish_and_clear();
    result
}

fn thinking_spinner(language: Language) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(thinking_message(language));
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn report_failure(error: &AssistantError, language: Language) {
    error.log();
    println!("{} {}", style("⚠").yellow(), error.user_message(language));
    if error.kind() != ErrorKind::InvalidInput {
        println!("  {}", style(error).dim());
    }
}

const fn greeting(language: Language) -> &'static str {
    match language {
        Language::French => "Bonjour ! Posez vos questions sur la santé mentale au Maroc.",
        Language::English => "Hello! Ask your questions about mental health in Morocco.",
        Language::Arabic => "مرحبًا! اطرح أسئلتك حول الصحة النفسية في المغرب.",
    }
}

const fn quit_hint(language: Language) -> &'static str {
    match language {
        Language::French => "Tapez /quit pour quitter.",
        Language::English => "Type /quit to leave.",
        Language::Arabic => "اكتب /quit للخروج.",
    }
}

const fn prompt_label(language: Language) -> &'static str {
    match language {
        Language::French => "Vous",
        Language::English => "You",
        Language::Arabic => "أنت",
    }
}

const fn assistant_label(language: Language) -> &'static str {
    match language {
        Language::French | Language::English => "MindCare:",
        Language::Arabic => "مايندكير:",
    }
}

const fn thinking_message(language: Language) -> &'static str {
    match language {
        Language::French => "L'assistant réfléchit...",
        Language::English => "The assistant is thinking...",
        Language::Arabic => "المساعد يفكر...",
    }
}
