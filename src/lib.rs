use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Index not found at {}: {reason}", path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error(
        "Index was built with embedding model '{indexed}' but queries use '{live}'; rebuild the index or change the embedding model"
    )]
    IndexVersionMismatch { indexed: String, live: String },

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod assistant;
pub mod commands;
pub mod config;
pub mod errors;
pub mod generation;
pub mod index;
pub mod memory;
pub mod providers;
pub mod retrieval;

pub use assistant::{AskOptions, AskState, Assistant, ChatSession};
pub use errors::ErrorKind;
pub use generation::Language;
