use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Result, ShopgraphError};

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionSettings {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
}

impl CompletionSettings {
    /// Settings for query interpretation.
    pub fn for_parsing(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.parse_max_tokens,
            temperature: config.parse_temperature,
            timeout: Duration::from_secs(config.parse_timeout_secs),
        }
    }

    /// Settings for relevance pruning.
    pub fn for_pruning(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.prune_max_tokens,
            temperature: config.prune_temperature,
            timeout: Duration::from_secs(config.prune_timeout_secs),
        }
    }
}

/// A single-shot, non-streaming completion endpoint.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one user prompt and return the reply text.
    async fn complete(&self, prompt: &str, settings: &CompletionSettings) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client
///
/// No retries: a failed or timed-out call is returned as an error and the
/// caller degrades.
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiChatClient {
    /// Create a client for `base_url` (e.g. `https://openrouter.ai/api/v1`).
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| ShopgraphError::Llm(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &LlmConfig, api_key: String) -> Result<Self> {
        Self::new(&config.base_url, api_key, config.model.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, prompt: &str, settings: &CompletionSettings) -> Result<String> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(settings.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ShopgraphError::Llm(format!("Request timed out after {:?}", settings.timeout))
                } else {
                    ShopgraphError::Llm(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            return Err(ShopgraphError::Llm(format!("API error {}: {}", status, body)));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| ShopgraphError::Llm(format!("Failed to parse response: {}", e)))?;

        let content = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ShopgraphError::Llm("Response has no message content".to_string()))?;

        log::debug!("Completion call took {:?} ({} chars)", start.elapsed(), content.len());
        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CompletionSettings {
        CompletionSettings {
            max_tokens: 800,
            temperature: 0.1,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let client = OpenAiChatClient::new("http://localhost:1234/v1/", "k".to_string(), "m".to_string()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");
        assert_eq!(client.model_name(), "m");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "max_tokens": 800
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  {\"ok\": true}  "}}]}"#)
            .create_async()
            .await;

        let client = OpenAiChatClient::new(&server.url(), "test-key".to_string(), "test-model".to_string()).unwrap();
        let reply = client.complete("hello", &settings()).await.unwrap();
        assert_eq!(reply, r#"{"ok": true}"#);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let client = OpenAiChatClient::new(&server.url(), "k".to_string(), "m".to_string()).unwrap();
        let err = client.complete("hello", &settings()).await.unwrap_err();
        assert!(matches!(err, ShopgraphError::Llm(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_complete_without_choices() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let client = OpenAiChatClient::new(&server.url(), "k".to_string(), "m".to_string()).unwrap();
        assert!(client.complete("hello", &settings()).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let client = OpenAiChatClient::new("http://127.0.0.1:9", "k".to_string(), "m".to_string()).unwrap();
        let err = client.complete("hello", &settings()).await.unwrap_err();
        assert!(matches!(err, ShopgraphError::Llm(_)));
    }
}
