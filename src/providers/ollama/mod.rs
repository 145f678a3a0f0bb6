
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{Embedder, Generator, normalize_model_id};
use crate::config::OllamaConfig;
use crate::{AssistantError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Blocking HTTP client for an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDetails {
    pub format: Option<String>,
    pub family: Option<String>,
    pub parameter_size: Option<String>,
    pub quantization_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| AssistantError::Config(e.to_string()))?;

        Ok(Self {
            base_url,
            agent: build_agent(config.request_timeout()),
            retry_attempts: config.retry_attempts.max(1),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check that the server answers and every model in `models` is pulled
    pub fn health_check(&self, models: &[&str]) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping()?;
        for model in models {
            self.validate_model(model)?;
        }

        info!(
            "Health check passed for Ollama server at {} with models {:?}",
            self.base_url, models
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    pub fn ping(&self) -> Result<()> {
        let url = self.endpoint("/api/tags")?;
        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        debug!("Server ping successful");
        Ok(())
    }

    /// Validate that `model` has been pulled on the server
    pub fn validate_model(&self, model: &str) -> Result<()> {
        let wanted = normalize_model_id(model);
        debug!("Validating model: {}", wanted);

        let models = self.list_models()?;

        if models.iter().any(|m| normalize_model_id(&m.name) == wanted) {
            debug!("Model {} is available", wanted);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                wanted, available_models
            );
            Err(AssistantError::ProviderUnavailable(format!(
                "model '{}' is not available; pulled models: {:?}",
                wanted, available_models
            )))
        }
    }

    /// List all available models
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/api/tags")?;
        debug!("Fetching available models from {}", url);

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let models_response: ModelsResponse = serde_json::from_str(&response_text)
            .context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Embed a single text with `model`
    pub fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let url = self.endpoint("/api/embed")?;
        let request_json = serde_json::to_string(&EmbedRequest { model, input: text })
            .context("Failed to serialize embedding request")?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let embed_response: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            AssistantError::ProviderUnavailable(format!("malformed embedding response: {e}"))
        })?;

        let embedding = embed_response
            .embeddings
            .into_iter()
            .next()
            .filter(|embedding| !embedding.is_empty())
            .ok_or_else(|| {
                AssistantError::ProviderUnavailable(format!(
                    "model '{model}' returned no embedding"
                ))
            })?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Complete `prompt` with `model` in a single non-streamed response
    pub fn generate(&self, model: &str, prompt: &str, temperature: f32) -> Result<String> {
        debug!("Generating completion (prompt length: {})", prompt.len());

        let url = self.endpoint("/api/generate")?;
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize generate request")?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .map_err(RequestFailure::into_generation_error)?;

        let generate_response: GenerateResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                AssistantError::GenerationFailed(format!("malformed generate response: {e}"))
            })?;

        debug!(
            "Generated completion of {} characters",
            generate_response.response.len()
        );
        Ok(generate_response.response)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| AssistantError::Config(format!("Invalid Ollama endpoint {path}: {e}")))
    }

    fn make_request_with_retry<F>(
        &self,
        mut request_fn: F,
    ) -> std::result::Result<String, RequestFailure>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_failure = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            let failure = match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(ureq::Error::StatusCode(status)) if status >= 500 => {
                    warn!(
                        "Server error (status {}), attempt {}/{}",
                        status, attempt, self.retry_attempts
                    );
                    RequestFailure::Rejected(format!("HTTP {status}"))
                }
                Err(ureq::Error::StatusCode(status)) => {
                    warn!("Client error (status {}), not retrying", status);
                    return Err(RequestFailure::Rejected(format!(
                        "Ollama rejected the request: HTTP {status}"
                    )));
                }
                Err(
                    error @ (ureq::Error::ConnectionFailed
                    | ureq::Error::HostNotFound
                    | ureq::Error::Timeout(_)
                    | ureq::Error::Io(_)),
                ) => {
                    warn!(
                        "Transport error: {}, attempt {}/{}",
                        error, attempt, self.retry_attempts
                    );
                    RequestFailure::Unreachable(error.to_string())
                }
                Err(error) => {
                    warn!("Non-retryable error: {}", error);
                    return Err(RequestFailure::Unreachable(format!(
                        "Non-retryable error: {error}"
                    )));
                }
            };
            last_failure = Some(failure);

            if attempt < self.retry_attempts {
                let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                let delay = Duration::from_millis(delay_ms);
                debug!("Waiting {:?} before retry", delay);
                std::thread::sleep(delay);
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(match last_failure {
            Some(RequestFailure::Rejected(reason)) => RequestFailure::Rejected(format!(
                "Ollama at {} kept failing after {} attempts: {}",
                self.base_url, self.retry_attempts, reason
            )),
            other => RequestFailure::Unreachable(format!(
                "Ollama at {} did not respond after {} attempts: {}",
                self.base_url,
                self.retry_attempts,
                other.map_or_else(|| "unknown error".to_string(), |f| f.to_string())
            )),
        })
    }
}

/// Why a request to Ollama produced no response body
#[derive(Debug, Error)]
enum RequestFailure {
    /// The server could not be reached
    #[error("{0}")]
    Unreachable(String),
    /// The server answered with an error status
    #[error("{0}")]
    Rejected(String),
}

impl RequestFailure {
    /// Error for the generate path: only an unreachable server is `ProviderUnavailable`
    fn into_generation_error(self) -> AssistantError {
        match self {
            Self::Unreachable(reason) => AssistantError::ProviderUnavailable(reason),
            Self::Rejected(reason) => AssistantError::GenerationFailed(reason),
        }
    }
}

impl From<RequestFailure> for AssistantError {
    #[inline]
    fn from(failure: RequestFailure) -> Self {
        Self::ProviderUnavailable(failure.to_string())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// [`Embedder`] backed by an Ollama embedding model
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
    model: String,
}

impl OllamaEmbedder {
    #[inline]
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AssistantError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let client = self.client.clone();
        let model = self.model.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.embed(&model, &text))
            .await
            .map_err(|e| AssistantError::ProviderUnavailable(format!("embedding task failed: {e}")))?
    }
}

/// [`Generator`] backed by an Ollama chat model
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    #[inline]
    pub fn new(client: OllamaClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let client = self.client.clone();
        let model = self.model.clone();
        let prompt = prompt.to_string();
        let temperature = self.temperature;
        tokio::task::spawn_blocking(move || client.generate(&model, &prompt, temperature))
            .await
            .map_err(|e| AssistantError::GenerationFailed(format!("generation task failed: {e}")))?
    }
}
