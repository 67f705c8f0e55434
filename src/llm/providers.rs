use super::{ChatMessage, Llm, LlmConfig, LlmProvider, LlmResponse};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Request body for OpenAI-compatible chat endpoints (LMStudio speaks the
/// same protocol).
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

fn build_request(config: &LlmConfig, messages: Vec<ChatMessage>) -> ChatRequest {
    ChatRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        response_format: config
            .json_mode
            .then(|| json!({"type": "json_object"})),
    }
}

fn extract_content(response: ChatResponse, provider: &str) -> Result<LlmResponse> {
    let content = response
        .choices
        .first()
        .ok_or_else(|| anyhow!("No response from {}", provider))?
        .message
        .content
        .clone();
    let tokens_used = response.usage.map(|u| u.total_tokens);
    Ok(LlmResponse {
        content,
        tokens_used,
    })
}

/// LMStudio provider implementation
pub struct LmStudioProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl LmStudioProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for LmStudioProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse> {
        let endpoint = self
            .config
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("LMStudio endpoint not configured"))?;

        let request = build_request(&self.config, messages);

        debug!("Sending request to LMStudio at {}", endpoint);

        let response = self.client.post(endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("LMStudio API error {}: {}", status, text));
        }

        extract_content(response.json().await?, "LMStudio")
    }

    fn provider_type(&self) -> LlmProvider {
        LlmProvider::LmStudio
    }
}

/// OpenAI provider implementation
pub struct OpenAiProvider {
    config: LlmConfig,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            return Err(anyhow!("OpenAI API key required"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Llm for OpenAiProvider {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<LlmResponse> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| anyhow!("OpenAI API key not configured"))?;

        let request = build_request(&self.config, messages);
        let url = "https://api.openai.com/v1/chat/completions";

        debug!("Sending request to OpenAI API");

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, text));
        }

        extract_content(response.json().await?, "OpenAI")
    }

    fn provider_type(&self) -> LlmProvider {
        LlmProvider::OpenAi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_mode_sets_response_format() {
        let config = LlmConfig::default();
        let request = build_request(&config, vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn json_mode_off_omits_response_format() {
        let config = LlmConfig {
            json_mode: false,
            ..LlmConfig::default()
        };
        let request = build_request(&config, vec![]);
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn openai_requires_api_key() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(OpenAiProvider::new(config).is_err());
    }

    #[test]
    fn extract_content_needs_a_choice() {
        let response = ChatResponse {
            choices: vec![],
            usage: None,
        };
        assert!(extract_content(response, "test").is_err());
    }
}
