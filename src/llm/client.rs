use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;

use super::model::{FragmentStream, LanguageModel};
use super::streaming::SseDeltaStream;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Configuration for an OpenAI-compatible chat-completions endpoint
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API key (from LLM_API_KEY env var)
    pub api_key: String,
    /// Base URL, e.g. "https://api.openai.com/v1"
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Temperature (0-2)
    pub temperature: f64,
    /// Maximum tokens in response
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Create config for the generation model from environment variables
    pub fn from_env() -> Result<Self, TransportError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| TransportError::Config("LLM_API_KEY environment variable not set".to_string()))?;

        Ok(Self {
            api_key,
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            temperature: 0.7,
            max_tokens: 4096,
        })
    }

    /// Config for the review model: REVIEW_LLM_* variables, each falling
    /// back to the matching generation setting. `None` when no review
    /// variable is set, meaning review shares the generation model.
    pub fn review_from_env(generation: &LlmConfig) -> Option<Self> {
        let api_key = std::env::var("REVIEW_LLM_API_KEY").ok();
        let base_url = std::env::var("REVIEW_LLM_BASE_URL").ok();
        let model = std::env::var("REVIEW_LLM_MODEL").ok();

        if api_key.is_none() && base_url.is_none() && model.is_none() {
            return None;
        }

        Some(Self {
            api_key: api_key.unwrap_or_else(|| generation.api_key.clone()),
            base_url: base_url.unwrap_or_else(|| generation.base_url.clone()),
            model: model.unwrap_or_else(|| generation.model.clone()),
            temperature: 0.3,
            max_tokens: generation.max_tokens,
        })
    }

    /// Create with custom settings
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            api_key,
            base_url,
            model,
            temperature: 0.7,
            max_tokens: 4096,
        }
    }

    /// Resolve the chat completions endpoint from the base URL
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

/// Chat-completions client implementing [`LanguageModel`]
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn request(&self, prompt: &str, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: Some(self.config.temperature),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream,
        }
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, TransportError> {
        let response = self
            .client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!("{} - {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, TransportError> {
        debug!("{}: completion request ({} chars)", self.config.model, prompt.chars().count());
        let response = self.send(&self.request(prompt, false)).await?;

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| TransportError::Parse(format!("Failed to parse chat response: {}", e)))?;

        // Extract text from the first choice
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TransportError::Api("No text content in response".to_string()))
    }

    fn stream<'a>(&'a self, prompt: &'a str) -> FragmentStream<'a> {
        Box::pin(async_stream::stream! {
            debug!("{}: streaming request ({} chars)", self.config.model, prompt.chars().count());
            let response = match self.send(&self.request(prompt, true)).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut deltas = SseDeltaStream::new(response.bytes_stream());
            while let Some(delta) = futures::StreamExt::next(&mut deltas).await {
                let failed = delta.is_err();
                yield delta;
                if failed {
                    return;
                }
            }
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> LlmConfig {
        LlmConfig::new("key".to_string(), base_url.to_string(), "test-model".to_string())
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(
            config("https://api.example.com/v1").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            config("https://api.example.com/v1/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            config("http://localhost:1234/v1/chat/completions").endpoint(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_request_serialization() {
        let client = ChatClient::new(config("http://localhost"));

        let plain = serde_json::to_value(client.request("你好", false)).unwrap();
        assert_eq!(plain["model"], "test-model");
        assert_eq!(plain["messages"][0]["content"], "你好");
        assert!(plain.get("stream").is_none());

        let streamed = serde_json::to_value(client.request("你好", true)).unwrap();
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn test_parse_chat_response() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"{\"category\":\"SLG\"}"}}]}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.choices[0].message.content.as_deref(),
            Some("{\"category\":\"SLG\"}")
        );
    }
}
