//! LLM backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{HttpClient, LlmProvider, ProviderError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopLlmSettings {
    pub response: String,
}

pub struct NoopLlmProvider {
    id: String,
    settings: NoopLlmSettings,
}

impl NoopLlmProvider {
    pub fn new(id: &str, settings: NoopLlmSettings) -> Self {
        Self {
            id: id.to_string(),
            settings,
        }
    }
}

#[async_trait]
impl LlmProvider for NoopLlmProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.settings.response.clone())
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

/// Settings for the `openai` LLM type. `endpoint` is the API base; the
/// backend appends `/chat/completions` and `/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiLlmSettings {
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiLlmProvider {
    id: String,
    settings: OpenAiLlmSettings,
    http: HttpClient,
}

impl OpenAiLlmProvider {
    pub fn new(
        id: &str,
        settings: OpenAiLlmSettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = HttpClient::new(settings.api_key.clone(), timeout)?;
        Ok(Self {
            id: id.to_string(),
            settings,
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.endpoint.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlmProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = self.url("chat/completions");
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        let response: ChatResponse = self.http.post_json(&url, &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse(url))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = self.url("models");
        let _: serde_json::Value = self.http.get_json(&url).await?;
        Ok(())
    }
}
