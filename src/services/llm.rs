/// Language-model collaborator
///
/// The pipeline only needs single-shot chat completions: an ordered list of role/content
/// messages and a temperature in, one text reply out. `OpenAiClient` speaks the
/// OpenAI-compatible `/chat/completions` protocol, which also covers hosted gateways
/// serving other models behind the same API.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for chat-completion backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Sends the conversation and returns the assistant's reply text
    async fn complete(&self, messages: Vec<ChatMessage>, temperature: f32) -> AppResult<String>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible completion APIs
#[derive(Clone)]
pub struct OpenAiClient {
    http_client: HttpClient,
    api_key: String,
    api_base: String,
    model: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        api_key: String,
        api_base: String,
        model: String,
        timeout: Duration,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        tracing::info!(model = %model, api_base = %api_base, "LLM client initialized");

        Ok(Self {
            http_client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            timeout,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout.as_secs())
        } else {
            AppError::HttpClient(e)
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, messages: Vec<ChatMessage>, temperature: f32) -> AppResult<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = CompletionRequest {
            model: &self.model,
            messages: &messages,
            temperature,
        };

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Collaborator(format!(
                "LLM API returned status {}: {}",
                status, body
            )));
        }

        let completion: CompletionResponse =
            response.json().await.map_err(|e| self.map_send_error(e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Collaborator("LLM API returned no choices".to_string()))?;

        tracing::debug!(
            model = %self.model,
            reply_chars = content.chars().count(),
            "Completion received"
        );

        Ok(content)
    }
}
