#[cfg(test)]
mod tests;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::Embedder;
use crate::config::OllamaConfig;
use crate::{Result, RetrievalError};

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Embedding provider backed by an Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    model_id: String,
    batch_size: u32,
    embedding_dimension: usize,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    /// Build a client without contacting the server
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .map_err(|e| RetrievalError::Config(e.to_string()))?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            model_id: format!("ollama/{}", tagged_model_name(&config.model)),
            batch_size: config.batch_size.max(1),
            embedding_dimension: config.embedding_dimension as usize,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Build a client and verify the server is reachable and serves the model.
    ///
    /// Any failure here is a [`RetrievalError::ModelLoad`].
    #[inline]
    pub fn connect(config: &OllamaConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client
            .health_check()
            .map_err(|e| RetrievalError::ModelLoad(format!("{:#}", e)))?;
        Ok(client)
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Test connection to Ollama server and verify model availability
    #[inline]
    pub fn health_check(&self) -> anyhow::Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        self.ping().context("Server ping failed")?;
        self.validate_model().context("Model validation failed")?;

        info!(
            "Health check passed for Ollama server at {} with model {}",
            self.base_url, self.model
        );
        Ok(())
    }

    /// Ping the Ollama server to check if it's responsive
    #[inline]
    pub fn ping(&self) -> anyhow::Result<()> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build ping URL")?;

        debug!("Pinging Ollama server at {}", url);

        self.make_request_with_retry(|| {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Failed to ping Ollama server")?;

        Ok(())
    }

    /// Validate that the configured model is available
    #[inline]
    pub fn validate_model(&self) -> anyhow::Result<()> {
        let models = self.list_models().context("Failed to list models")?;

        if models.iter().any(|m| same_model(&m.name, &self.model)) {
            debug!("Model {} is available", self.model);
            Ok(())
        } else {
            let available_models: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            warn!(
                "Model {} not found. Available models: {:?}",
                self.model, available_models
            );
            Err(anyhow::anyhow!(
                "Model '{}' is not available. Available models: {:?}",
                self.model,
                available_models
            ))
        }
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> anyhow::Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.model,
            input: text,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let mut embeddings = self
            .post_embed(&request_json)
            .context("Failed to generate embedding")?;

        if embeddings.len() != 1 {
            return Err(anyhow::anyhow!(
                "Expected 1 embedding, server returned {}",
                embeddings.len()
            ));
        }
        let embedding = embeddings.remove(0);
        self.check_dimension(&embedding)?;

        Ok(embedding)
    }

    /// Generate embeddings for multiple texts, `batch_size` at a time
    #[inline]
    pub fn generate_embeddings_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size as usize) {
            let batch = self
                .generate_embeddings_single_batch(chunk)
                .with_context(|| format!("Failed to process batch of {} texts", chunk.len()))?;
            results.extend(batch);
        }

        debug!("Generated {} embeddings total", results.len());
        Ok(results)
    }

    fn generate_embeddings_single_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        if let [text] = texts {
            return Ok(vec![self.generate_embedding(text)?]);
        }

        let request = BatchEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let request_json = serde_json::to_string(&request)
            .context("Failed to serialize batch embedding request")?;

        let embeddings = self
            .post_embed(&request_json)
            .context("Failed to generate batch embeddings")?;

        if embeddings.len() != texts.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                texts.len(),
                embeddings.len()
            ));
        }
        for embedding in &embeddings {
            self.check_dimension(embedding)?;
        }

        Ok(embeddings)
    }

    fn post_embed(&self, request_json: &str) -> anyhow::Result<Vec<Vec<f32>>> {
        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let response_text = self.make_request_with_retry(|| {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;
        Ok(response.embeddings)
    }

    fn check_dimension(&self, embedding: &[f32]) -> anyhow::Result<()> {
        if embedding.len() != self.embedding_dimension {
            return Err(anyhow::anyhow!(
                "Model {} returned {} dimensions, configured for {}",
                self.model,
                embedding.len(),
                self.embedding_dimension
            ));
        }
        Ok(())
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> anyhow::Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => return Ok(response_text),
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => false,
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

impl Embedder for OllamaClient {
    #[inline]
    fn model_id(&self) -> &str {
        &self.model_id
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embedding(text)
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.generate_embeddings_batch(texts)
            .map_err(|e| RetrievalError::Embedding(format!("{:#}", e)))
    }
}

/// Ollama reports untagged models as `name:latest`
/// Model name with Ollama's implicit `:latest` tag spelled out
fn tagged_model_name(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{}:latest", name)
    }
}

fn same_model(available: &str, configured: &str) -> bool {
    tagged_model_name(available) == tagged_model_name(configured)
}
