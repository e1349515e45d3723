// Text generation over an OpenAI-compatible HTTP API

#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::config::GenerationConfig;
use crate::{Result, RetrievalError};

/// Turns a prompt into text
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for `/v1/completions` and `/v1/chat/completions` style endpoints
#[derive(Debug, Clone)]
pub struct CompletionClient {
    base_url: Url,
    completion_path: String,
    chat_completion_path: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    api_key: String,
    stop: Option<Vec<String>>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: serde_json::Value,
}

impl CompletionClient {
    /// Build a client from configuration.
    ///
    /// Fails with a `Config` error when no API key is configured.
    #[inline]
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                RetrievalError::Config(format!(
                    "No API key for the generation endpoint; set {} or generation.api_key",
                    crate::config::settings::API_KEY_ENV
                ))
            })?;
        let base_url = Url::parse(&config.api_base).map_err(|e| {
            RetrievalError::Config(format!("Invalid api_base '{}': {}", config.api_base, e))
        })?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_secs.max(1))))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            completion_path: config.completion_path.clone(),
            chat_completion_path: config.chat_completion_path.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            api_key,
            stop: config.stop.clone(),
            agent,
        })
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Whether `model` is served by the chat endpoint
    #[inline]
    pub fn is_chat_model(model: &str) -> bool {
        model.starts_with("gpt-3.5-turbo") || model.starts_with("gpt-4")
    }

    /// Generate with per-call stop sequences.
    ///
    /// Stop sequences may come from the configuration or from this call, not both.
    #[inline]
    pub fn generate_with_stop(&self, prompt: &str, stop: Option<&[String]>) -> Result<String> {
        let stop = match (stop, self.stop.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(RetrievalError::Generation(
                    "Stop sequences found in both the call and the configuration".to_string(),
                ));
            }
            (call, configured) => call.or(configured),
        };

        let chat = Self::is_chat_model(&self.model);
        let (path, body) = if chat {
            let request = ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stop,
            };
            (&self.chat_completion_path, serde_json::to_string(&request))
        } else {
            let request = CompletionRequest {
                model: &self.model,
                prompt,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                stop,
            };
            (&self.completion_path, serde_json::to_string(&request))
        };
        let body = body
            .map_err(|e| RetrievalError::Generation(format!("Failed to encode request: {}", e)))?;

        let url = self.base_url.join(path).map_err(|e| {
            RetrievalError::Config(format!("Invalid completion path '{}': {}", path, e))
        })?;
        debug!("Requesting completion from {} with {}", url, self.model);

        let mut response = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .send(body.as_str())
            .map_err(|e| RetrievalError::Generation(format!("Request failed: {}", e)))?;

        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| RetrievalError::Generation(format!("Failed to read response: {}", e)))?;

        if status != 200 {
            let detail = serde_json::from_str::<ErrorResponse>(&text)
                .map(|r| match r.error {
                    serde_json::Value::String(message) => message,
                    other => other.to_string(),
                })
                .unwrap_or(text);
            warn!("Completion endpoint returned HTTP {}", status);
            return Err(RetrievalError::Generation(format!(
                "HTTP {}: {}",
                status, detail
            )));
        }

        parse_completion(&text, chat)
    }
}

impl TextGenerator for CompletionClient {
    #[inline]
    fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_stop(prompt, None)
    }
}

fn parse_completion(body: &str, chat: bool) -> Result<String> {
    let response: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| RetrievalError::Generation(format!("Malformed response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RetrievalError::Generation("Response contained no choices".to_string()))?;

    let text = if chat {
        choice.message.map(|m| m.content)
    } else {
        choice.text
    };

    text.map(|t| t.trim().to_string()).ok_or_else(|| {
        RetrievalError::Generation("Response choice carried no text".to_string())
    })
}
