use anyhow::Result;
use clap::{Parser, Subcommand};
use mindcare_assistant::Language;
use mindcare_assistant::commands::{ask_question, run_chat, show_status};
use mindcare_assistant::config::{Config, get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mindcare")]
#[command(about = "Question answering over the MindCare mental-health directory")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.mindcare)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama, retrieval and assistant settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ask a single question and print the answer
    Ask {
        /// The question to answer
        question: String,
        /// Answer language: fr, en or ar
        #[arg(long)]
        language: Option<Language>,
    },
    /// Start an interactive conversation
    Chat {
        /// Answer language: fr, en or ar
        #[arg(long)]
        language: Option<Language>,
    },
    /// Show configuration, index and Ollama status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries answers, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&Config::load(&config_dir)?);
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ask { question, language } => {
            ask_question(&Config::load(&config_dir)?, &question, language).await?;
        }
        Commands::Chat { language } => {
            run_chat(&Config::load(&config_dir)?, language).await?;
        }
        Commands::Status => {
            show_status(&Config::load(&config_dir)?).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ask_command_with_question() {
        let cli = Cli::try_parse_from(["mindcare", "ask", "Où trouver un psychiatre à Fès ?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { question, language } = parsed.command {
                assert_eq!(question, "Où trouver un psychiatre à Fès ?");
                assert_eq!(language, None);
            } else {
                panic!("expected the ask command");
            }
        }
    }

    #[test]
    fn ask_command_with_language() {
        let cli = Cli::try_parse_from(["mindcare", "ask", "Where?", "--language", "en"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ask { language, .. } = parsed.command {
                assert_eq!(language, Some(Language::English));
            }
        }
    }

    #[test]
    fn unknown_language_is_rejected() {
        let cli = Cli::try_parse_from(["mindcare", "chat", "--language", "de"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn chat_command() {
        let cli = Cli::try_parse_from(["mindcare", "chat"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Chat { language: None }));
            assert_eq!(parsed.config_dir, None);
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["mindcare", "status", "--config-dir", "/tmp/mindcare"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Status));
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/mindcare")));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["mindcare", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn ask_requires_a_question() {
        let cli = Cli::try_parse_from(["mindcare", "ask"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["mindcare", "serve"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["mindcare", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
