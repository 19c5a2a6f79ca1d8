use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChatError {
    /// 401/403: the provider rejected our credentials. Not retryable and
    /// callers should treat it as a provider-wide outage, not a per-call one.
    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("empty response from model")]
    Empty,
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        ChatError::Transport(e.to_string())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// --- Chat ---

/// Chat-completion client for one (base_url, model) pair.
#[derive(Clone)]
pub struct ChatClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: "https://api.together.xyz/v1".to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One chat turn: system + user in, assistant text out.
    pub async fn chat_completion(&self, system: &str, user: &str) -> Result<String, ChatError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                WireMessage { role: "system", content: system },
                WireMessage { role: "user", content: user },
            ],
            max_tokens: estimate_max_tokens(system, user),
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, "chat request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ChatError::Auth(message));
            }
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ChatError::Empty)
    }
}

/// Output budget scales with input size: roughly 30% of the estimated input
/// tokens, clamped to [150, 4096]. ~1 token per 4 chars.
fn estimate_max_tokens(system: &str, user: &str) -> u32 {
    let input_tokens = (system.len() + user.len()) / 4;
    (input_tokens * 30 / 100).clamp(150, 4096) as u32
}

// --- Embeddings ---

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

/// Embeddings client for an OpenAI-compatible `/embeddings` endpoint.
#[derive(Clone)]
pub struct EmbeddingsClient {
    api_key: String,
    model: String,
    base_url: String,
    http: reqwest::Client,
}

impl EmbeddingsClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch of texts. One vector per input, same order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ChatError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        debug!(model = %self.model, count = texts.len(), "embeddings request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ChatError::Auth(message));
            }
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbeddingsResponse = response.json().await?;
        if body.data.len() != texts.len() {
            return Err(ChatError::Api {
                status: status.as_u16(),
                message: format!(
                    "embedding count mismatch: sent {}, got {}",
                    texts.len(),
                    body.data.len()
                ),
            });
        }

        Ok(body.data.into_iter().map(|r| r.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_tokens_clamps_small_inputs() {
        assert_eq!(estimate_max_tokens("sys", "short"), 150);
    }

    #[test]
    fn max_tokens_scales_with_input() {
        let user = "x".repeat(40_000);
        // 10k input tokens -> 3k output budget
        assert_eq!(estimate_max_tokens("", &user), 3000);
    }

    #[test]
    fn max_tokens_caps_at_4096() {
        let user = "x".repeat(400_000);
        assert_eq!(estimate_max_tokens("", &user), 4096);
    }
}
