//! Model provider seams
//!
//! The orchestrator only talks to [`Embedder`] and [`Generator`]; the Ollama
//! implementations live in [`ollama`] and tests substitute deterministic fakes.

pub mod ollama;

use async_trait::async_trait;

use crate::Result;

pub use ollama::{OllamaClient, OllamaEmbedder, OllamaGenerator};

/// Turns text into a fixed-dimension vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier of the embedding model, compared against the index manifest
    fn model_id(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Completes a prompt with free text
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Canonical form of an Ollama model name: untagged names get `:latest`
#[inline]
pub fn normalize_model_id(model: &str) -> String {
    let model = model.trim();
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{model}:latest")
    }
}
