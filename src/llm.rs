//! Language model providers.
//!
//! - **[`DisabledModel`]**: always reports the model as unavailable.
//! - **[`OpenAIChat`]**: OpenAI-compatible chat completions with retry and backoff.
//!
//! Each prompt is sent as a single user message; no conversation state is
//! kept between calls.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use askbase_core::error::ModelError;
use askbase_core::llm::LanguageModel;

use crate::config::LlmConfig;
use crate::http::{post_json_with_retry, HttpFailure};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// A model that is switched off.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &str, _temperature: f32) -> Result<String, ModelError> {
        Err(ModelError::Unavailable(
            "language model provider is disabled".to_string(),
        ))
    }
}

/// Chat completions client.
///
/// Requires `OPENAI_API_KEY`. `llm.url` may point at any
/// OpenAI-compatible endpoint.
pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: String,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key,
            max_retries: config.max_retries,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| ModelError::MalformedResponse(e.to_string()))?;

        let started = std::time::Instant::now();
        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await
        .map_err(|failure| match failure {
            HttpFailure::RateLimited(m) => ModelError::RateLimited(m),
            HttpFailure::Decode(m) => ModelError::MalformedResponse(m),
            other => ModelError::Unavailable(other.to_string()),
        })?;

        let text = parse_chat_response(&json)?;
        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            "completion received"
        );
        Ok(text)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &serde_json::Value) -> Result<String, ModelError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            ModelError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}

/// Create the model selected by `config.provider`.
pub fn create_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Hello!\n" } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "Hello!");
    }

    #[test]
    fn test_parse_chat_response_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_chat_response(&json),
            Err(ModelError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_disabled_model_is_unavailable() {
        let model = create_model(&LlmConfig::default()).unwrap();
        assert!(matches!(
            model.complete("hi", 0.3).await,
            Err(ModelError::Unavailable(_))
        ));
    }
}
