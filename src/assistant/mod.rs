//! The question-answering pipeline
//!
//! [`Assistant`] holds the components shared by every conversation: the
//! embedder, the read-only index and the answer generator. Each
//! conversation is a [`ChatSession`] that owns its own memory and drives one
//! question at a time through embedding, retrieval and generation.


use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::config::settings::{
    DEFAULT_GENERATION_TIMEOUT_SECONDS, DEFAULT_HISTORY_TURNS, DEFAULT_TOP_K,
};
use crate::generation::{AnswerGenerator, GroundingMode, Language, PromptBuilder};
use crate::index::{IndexStore, load_index};
use crate::memory::{ConversationMemory, Role};
use crate::providers::{Embedder, Generator, OllamaClient, OllamaEmbedder, OllamaGenerator};
use crate::retrieval::Retriever;
use crate::{AssistantError, Result};

/// Progress of a single `ask` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AskState {
    #[default]
    Idle,
    Embedding,
    Retrieving,
    Generating,
    Done,
    Failed,
}

impl fmt::Display for AskState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Embedding => "embedding",
            Self::Retrieving => "retrieving",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tuning of the pipeline, usually taken from [`Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantSettings {
    pub top_k: usize,
    pub max_distance: Option<f32>,
    /// Number of most recent turns rendered into the prompt, trimmed so
    /// the window never opens on an assistant reply
    pub history_turns: usize,
    pub language: Language,
    pub generation_timeout: Duration,
    pub grounding: GroundingMode,
    pub not_found_phrase: Option<String>,
    /// Search with a standalone rewrite of follow-up questions
    pub condense_follow_ups: bool,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            max_distance: None,
            history_turns: DEFAULT_HISTORY_TURNS,
            language: Language::default(),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECONDS),
            grounding: GroundingMode::default(),
            not_found_phrase: None,
            condense_follow_ups: false,
        }
    }
}

impl AssistantSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_distance: config.retrieval.max_distance,
            history_turns: config.assistant.history_turns,
            language: config.assistant.language,
            generation_timeout: config.assistant.generation_timeout(),
            grounding: config.assistant.grounding,
            not_found_phrase: config.assistant.not_found_phrase.clone(),
            condense_follow_ups: config.assistant.condense_follow_ups,
        }
    }
}

/// Components shared by every chat session
pub struct Assistant {
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    answers: AnswerGenerator,
    settings: AssistantSettings,
}

impl Assistant {
    /// Wire the pipeline from already constructed components
    ///
    /// Fails with `IndexVersionMismatch` when the index was embedded with a
    /// different model than `embedder`.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn IndexStore>,
        generator: Arc<dyn Generator>,
        settings: AssistantSettings,
    ) -> Result<Self> {
        index.manifest().ensure_compatible(embedder.model_id())?;

        let retriever = Retriever::new(index, settings.top_k, settings.max_distance)?;
        let answers = AnswerGenerator::new(
            generator,
            PromptBuilder::new(settings.not_found_phrase.clone()),
            settings.grounding,
            settings.generation_timeout,
        );

        Ok(Self {
            embedder,
            retriever,
            answers,
            settings,
        })
    }

    /// Build the Ollama providers and load the index described by `config`
    pub async fn initialize(config: &Config) -> Result<Arc<Self>> {
        config
            .validate()
            .map_err(|e| AssistantError::Config(e.to_string()))?;

        let index_path = config.index_path();
        info!("Initializing assistant with index {}", index_path.display());
        let index = load_index(&index_path).await?;

        let client = OllamaClient::new(&config.ollama)?;
        let embedder = Arc::new(OllamaEmbedder::new(
            client.clone(),
            config.ollama.embedding_model.clone(),
        ));
        let generator = Arc::new(OllamaGenerator::new(
            client,
            config.ollama.chat_model.clone(),
            config.ollama.temperature,
        ));

        let assistant = Self::new(
            embedder,
            index,
            generator,
            AssistantSettings::from_config(config),
        )?;
        info!(
            "Assistant ready (embedding model {}, chat model {})",
            config.ollama.embedding_model, config.ollama.chat_model
        );
        Ok(Arc::new(assistant))
    }

    /// Start a conversation with its own empty memory
    #[inline]
    pub fn session(self: &Arc<Self>) -> ChatSession {
        ChatSession::new(Arc::clone(self))
    }

    #[inline]
    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    #[inline]
    pub fn index(&self) -> &Arc<dyn IndexStore> {
        self.retriever.index()
    }
}

/// Per-call overrides for [`ChatSession::ask_with`]
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub language: Option<Language>,
    pub cancellation: Option<CancellationToken>,
}

impl AskOptions {
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// One conversation
///
/// `ask` takes `&mut self`, so a session can only answer one question at a
/// time. Independent sessions share the [`Assistant`] and nothing else.
pub struct ChatSession {
    id: Uuid,
    assistant: Arc<Assistant>,
    memory: ConversationMemory,
    language: Language,
    state: AskState,
}

impl ChatSession {
    fn new(assistant: Arc<Assistant>) -> Self {
        let language = assistant.settings.language;
        Self {
            id: Uuid::new_v4(),
            assistant,
            memory: ConversationMemory::new(),
            language,
            state: AskState::Idle,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    #[inline]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[inline]
    pub fn language(&self) -> Language {
        self.language
    }

    #[inline]
    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// State reached by the most recent `ask`
    #[inline]
    pub fn state(&self) -> AskState {
        self.state
    }

    /// Answer `question` in the session language
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        self.ask_with(question, AskOptions::default()).await
    }

    /// Answer `question`, recording both turns in memory on success
    ///
    /// A blank question is rejected before any work is done. On any failure
    /// the memory is left exactly as it was.
    pub async fn ask_with(&mut self, question: &str, options: AskOptions) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AssistantError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        let language = options.language.unwrap_or(self.language);
        let cancellation = options.cancellation.unwrap_or_default();

        self.state = AskState::Idle;
        match self.run(question, language, &cancellation).await {
            Ok(answer) => {
                self.transition(AskState::Done);
                self.memory.append(Role::User, question);
                self.memory.append(Role::Assistant, answer.clone());
                Ok(answer)
            }
            Err(error) => {
                warn!("Session {}: ask failed while {}: {}", self.id, self.state, error);
                self.transition(AskState::Failed);
                Err(error)
            }
        }
    }

    async fn run(
        &mut self,
        question: &str,
        language: Language,
        cancellation: &CancellationToken,
    ) -> Result<String> {
        let assistant = Arc::clone(&self.assistant);
        let history_turns = assistant.settings.history_turns;

        self.transition(AskState::Embedding);
        let search_query = if assistant.settings.condense_follow_ups {
            let history = self.memory.recent_exchanges(history_turns);
            assistant
                .answers
                .condense(question, history, language, cancellation)
                .await?
        } else {
            question.to_string()
        };
        let query_vector = assistant
            .embedder
            .embed(&search_query)
            .await
            .map_err(into_provider_error)?;

        self.transition(AskState::Retrieving);
        let retrieved = assistant.retriever.retrieve(&query_vector).await?;

        self.transition(AskState::Generating);
        let history = self.memory.recent_exchanges(history_turns);
        assistant
            .answers
            .answer(question, &retrieved, history, language, cancellation)
            .await
    }

    fn transition(&mut self, next: AskState) {
        debug!("Session {}: {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}

fn into_provider_error(error: AssistantError) -> AssistantError {
    match error {
        AssistantError::ProviderUnavailable(_) => error,
        other => AssistantError::ProviderUnavailable(other.to_string()),
    }
}
