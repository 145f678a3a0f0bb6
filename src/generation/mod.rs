//! Prompt construction and answer generation
//!
//! [`AnswerGenerator`] turns a question, the retrieved documents and the
//! conversation history into a single prompt, hands it to a
//! [`Generator`](crate::providers::Generator) and post-processes the reply.

#[cfg(test)]
mod tests;

pub mod grounding;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::memory::Turn;
use crate::providers::Generator;
use crate::retrieval::RetrievalResult;
use crate::{AssistantError, Result};

pub use grounding::{content_tokens, is_grounded, mentions_phrase};
pub use prompt::PromptBuilder;

/// Target language of the assistant's answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "fr", alias = "french")]
    French,
    #[serde(rename = "en", alias = "english")]
    English,
    #[serde(rename = "ar", alias = "arabic")]
    Arabic,
}

impl Language {
    #[inline]
    pub const fn code(self) -> &'static str {
        match self {
            Self::French => "fr",
            Self::English => "en",
            Self::Arabic => "ar",
        }
    }

    #[inline]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::French => "Français",
            Self::English => "English",
            Self::Arabic => "العربية",
        }
    }

    /// Phrase the assistant uses when the documents do not answer the question
    #[inline]
    pub const fn not_found_phrase(self) -> &'static str {
        match self {
            Self::French => "Je n'ai pas cette information dans mes documents.",
            Self::English => "I don't have this information in my documents.",
            Self::Arabic => "ليست لدي هذه المعلومة في وثائقي.",
        }
    }
}

impl fmt::Display for Language {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Error)]
#[error("Unknown language: {0} (expected fr, en or ar)")]
pub struct UnknownLanguage(String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fr" | "french" | "français" | "francais" => Ok(Self::French),
            "en" | "english" => Ok(Self::English),
            "ar" | "arabic" | "العربية" => Ok(Self::Arabic),
            _ => Err(UnknownLanguage(s.to_string())),
        }
    }
}

/// How strictly answers are held to the retrieved documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroundingMode {
    /// The prompt asks the model not to fabricate; nothing is verified
    #[default]
    Advisory,
    /// Answers with no lexical overlap with the context are replaced by the
    /// not-found phrase
    Strict,
}

impl fmt::Display for GroundingMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advisory => f.write_str("advisory"),
            Self::Strict => f.write_str("strict"),
        }
    }
}

pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    prompts: PromptBuilder,
    grounding: GroundingMode,
    timeout: Duration,
}

impl AnswerGenerator {
    #[inline]
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: PromptBuilder,
        grounding: GroundingMode,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            prompts,
            grounding,
            timeout,
        }
    }

    #[inline]
    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    #[inline]
    pub fn generator(&self) -> &Arc<dyn Generator> {
        &self.generator
    }

    /// Generate an answer for `question` from the retrieved documents and history
    ///
    /// Timeouts, cancellation and empty model output all surface as
    /// [`AssistantError::GenerationFailed`].
    pub async fn answer(
        &self,
        question: &str,
        retrieved: &RetrievalResult,
        history: &[Turn],
        language: Language,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let prompt = self.prompts.build(question, retrieved, history, language);
        debug!(
            "Generating answer with {} ({} context documents, {} history turns, prompt length {})",
            self.generator.model_id(),
            retrieved.len(),
            history.len(),
            prompt.len()
        );

        let answer = self.complete(&prompt, cancellation).await?;

        if self.grounding == GroundingMode::Strict {
            let not_found = self.prompts.not_found_phrase(language);
            if !mentions_phrase(&answer, not_found) && !is_grounded(&answer, &retrieved.texts()) {
                info!("Answer not supported by retrieved documents, replacing with refusal");
                return Ok(not_found.to_string());
            }
        }

        Ok(answer)
    }

    /// Rewrite a follow-up `question` into one that stands on its own
    ///
    /// With no history there is nothing to resolve and the question is
    /// returned unchanged without calling the model.
    pub async fn condense(
        &self,
        question: &str,
        history: &[Turn],
        language: Language,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let question = question.trim();
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = self.prompts.build_condense(question, history, language);
        debug!(
            "Condensing follow-up with {} ({} history turns)",
            self.generator.model_id(),
            history.len()
        );

        let standalone = self.complete(&prompt, cancellation).await?;
        let standalone = standalone
            .lines()
            .map(|line| line.trim().trim_matches(['"', '«', '»']).trim())
            .find(|line| !line.is_empty())
            .unwrap_or(question)
            .to_string();

        info!("Condensed follow-up \"{}\" into \"{}\"", question, standalone);
        Ok(standalone)
    }

    /// Trimmed model output for `prompt`, bounded by the deadline and `cancellation`
    async fn complete(&self, prompt: &str, cancellation: &CancellationToken) -> Result<String> {
        let raw = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                warn!("Generation cancelled by caller");
                return Err(AssistantError::GenerationFailed(
                    "generation was cancelled".to_string(),
                ));
            }
            outcome = tokio::time::timeout(self.timeout, self.generator.generate(prompt)) => {
                match outcome {
                    Ok(result) => result.map_err(into_generation_error)?,
                    Err(_) => {
                        warn!("Generation timed out after {:?}", self.timeout);
                        return Err(AssistantError::GenerationFailed(format!(
                            "no answer within {:?}",
                            self.timeout
                        )));
                    }
                }
            }
        };

        let output = raw.trim();
        if output.is_empty() {
            return Err(AssistantError::GenerationFailed(
                "model returned an empty answer".to_string(),
            ));
        }
        Ok(output.to_string())
    }
}

fn into_generation_error(error: AssistantError) -> AssistantError {
    match error {
        AssistantError::GenerationFailed(_) | AssistantError::ProviderUnavailable(_) => error,
        other => AssistantError::GenerationFailed(other.to_string()),
    }
}
