//! OpenAI-compatible client behind the `LlmClient` capability.

use std::time::Duration;

use async_trait::async_trait;
use openai_dive::v1::api::Client;
use openai_dive::v1::resources::chat::{
    ChatCompletionParameters, ChatMessage, ChatMessageContent,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{LlmError, LlmResult};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// One chat-completion request. Temperature is chosen per decision by the
/// caller (lore 0.7, descriptions 0.8, NPC decisions from wisdom).
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_context: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the assistant message content of the first choice.
    async fn chat_completion(&self, request: ChatRequest) -> LlmResult<String>;

    async fn create_embedding(&self, text: &str, model: &str) -> LlmResult<Vec<f64>>;

    /// Release any held connections. Idempotent.
    async fn close(&self);
}

pub struct OpenAiClient {
    client: Client,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: String) -> LlmResult<Self> {
        Self::with_timeout(api_key, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(api_key: String, timeout: Duration) -> LlmResult<Self> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            client: Client::new(api_key.clone()),
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout,
        })
    }
}

/// Strip markdown fences models sometimes wrap JSON replies in.
pub fn clean_json_reply(reply: &str) -> &str {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f64>,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(&self, request: ChatRequest) -> LlmResult<String> {
        let parameters = ChatCompletionParameters {
            model: request.model.clone(),
            messages: vec![
                ChatMessage::System {
                    content: ChatMessageContent::Text(request.system_prompt),
                    name: None,
                },
                ChatMessage::User {
                    content: ChatMessageContent::Text(request.user_context),
                    name: None,
                },
            ],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        // A timeout is a transport failure; callers take their fallback path.
        let response = tokio::time::timeout(self.timeout, self.client.chat().create(parameters))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let Some(choice) = response.choices.first() else {
            return Err(LlmError::Parse("no choices in response".into()));
        };
        match &choice.message {
            ChatMessage::Assistant {
                content: Some(ChatMessageContent::Text(text)),
                ..
            } => Ok(text.clone()),
            _ => Err(LlmError::Parse("unexpected message shape".into())),
        }
    }

    async fn create_embedding(&self, text: &str, model: &str) -> LlmResult<Vec<f64>> {
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": model, "input": text }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout.as_secs())
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(LlmError::Transport(format!(
                "embeddings endpoint returned {}",
                response.status()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| LlmError::Parse("empty embedding response".into()))
    }

    async fn close(&self) {
        // reqwest and openai_dive pool connections internally; dropping the
        // client is sufficient.
        tracing::debug!("LLM client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            OpenAiClient::new(String::new()),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn json_fences_are_stripped() {
        let fenced = "```json\n{\"action\": \"flee\"}\n```";
        assert_eq!(clean_json_reply(fenced), "{\"action\": \"flee\"}");
        assert_eq!(clean_json_reply("{\"a\":1}"), "{\"a\":1}");
    }
}
