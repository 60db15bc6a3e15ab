//! Embedding backends.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{EmbeddingProvider, HttpClient, ProviderError};
use ragbridge_core::models::ContentPart;

/// Settings for the `noop` embedding type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopEmbeddingSettings {
    pub vector: Vec<f32>,
    #[serde(default)]
    pub token_count: u32,
}

/// Returns the configured vector for every input. Used offline and in tests.
pub struct NoopEmbeddingProvider {
    id: String,
    settings: NoopEmbeddingSettings,
}

impl NoopEmbeddingProvider {
    pub fn new(id: &str, settings: NoopEmbeddingSettings) -> Self {
        Self {
            id: id.to_string(),
            settings,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for NoopEmbeddingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<ContentPart>, ProviderError> {
        Ok(vec![ContentPart {
            text: text.to_string(),
            vector: self.settings.vector.clone(),
            provider_id: self.id.clone(),
            token_count: self.settings.token_count,
            generated_at: Utc::now(),
        }])
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Settings for the `http` embedding type.
///
/// `endpoint` is the full embeddings URL, e.g.
/// `https://api.openai.com/v1/embeddings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpEmbeddingSettings {
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
}

const HEALTH_PROBE: &str = "health check";

pub struct HttpEmbeddingProvider {
    id: String,
    settings: HttpEmbeddingSettings,
    http: HttpClient,
}

impl HttpEmbeddingProvider {
    pub fn new(
        id: &str,
        settings: HttpEmbeddingSettings,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let http = HttpClient::new(settings.api_key.clone(), timeout)?;
        Ok(Self {
            id: id.to_string(),
            settings,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_embedding(&self, text: &str) -> Result<Vec<ContentPart>, ProviderError> {
        let url = self.settings.endpoint.as_str();
        let request = EmbeddingRequest {
            input: text,
            model: &self.settings.model,
        };
        let response: EmbeddingResponse = self.http.post_json(url, &request).await?;

        let first = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::EmptyResponse(url.to_string()))?;

        Ok(vec![ContentPart {
            text: text.to_string(),
            vector: first.embedding,
            provider_id: self.id.clone(),
            token_count: response.usage.prompt_tokens,
            generated_at: Utc::now(),
        }])
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.get_embedding(HEALTH_PROBE).await.map(|_| ())
    }
}
