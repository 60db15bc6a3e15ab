//! Embedding and LLM provider abstraction.
//!
//! Both families are trait objects selected at runtime from the stored
//! configuration (see [`factory`]). Each family is a closed set of kinds:
//!
//! | Category | Type tag | Backend |
//! |----------|----------|---------|
//! | embedding | `noop` | fixed vector, always healthy |
//! | embedding | `http` | remote embeddings endpoint, bearer auth |
//! | llm | `noop` | fixed canned response |
//! | llm | `openai` | OpenAI-style chat completions |
//!
//! Providers never retry. Errors are typed so callers can tell a
//! misconfiguration ([`ProviderError::is_configuration`]) from an
//! upstream failure.

pub mod embedding;
pub mod factory;
pub mod llm;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use ragbridge_core::models::{ContentPart, Document, Embedding, ProviderCategory};

pub use embedding::{HttpEmbeddingProvider, NoopEmbeddingProvider};
pub use factory::{
    build_embedding_provider, build_llm_provider, EmbeddingKind, LlmKind, ProviderFactory,
};
pub use llm::{NoopLlmProvider, OpenAiLlmProvider};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("failed to build request to {url}: {message}")]
    Request { url: String, message: String },
    #[error("network error calling {url}: {message}")]
    Network { url: String, message: String },
    #[error("{url} returned {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{0} returned an empty result")]
    EmptyResponse(String),
    #[error("unsupported {category} provider type '{provider_type}'")]
    UnsupportedType {
        category: ProviderCategory,
        provider_type: String,
    },
    #[error("invalid settings for {category} provider '{id}' ({provider_type}): {message}")]
    InvalidSettings {
        category: ProviderCategory,
        id: String,
        provider_type: &'static str,
        message: String,
    },
    #[error("failed to load active {category} provider: {error:#}")]
    ConfigStore {
        category: ProviderCategory,
        error: anyhow::Error,
    },
}

impl ProviderError {
    /// True for errors that retrying cannot fix.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProviderError::UnsupportedType { .. }
                | ProviderError::InvalidSettings { .. }
                | ProviderError::ConfigStore { .. }
        )
    }

    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let url = url.to_string();
        let message = e.to_string();
        if e.is_builder() {
            ProviderError::Request { url, message }
        } else if e.is_decode() {
            ProviderError::Decode { url, message }
        } else {
            ProviderError::Network { url, message }
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Id of the provider configuration; stamped on every content part.
    fn id(&self) -> &str;

    async fn get_embedding(&self, text: &str) -> Result<Vec<ContentPart>, ProviderError>;

    /// Embed the document body and replace its embedding record.
    async fn process(&self, document: &mut Document) -> Result<(), ProviderError> {
        let parts = self.get_embedding(&document.body).await?;
        document.embedding = Embedding { parts };
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    async fn health_check(&self) -> Result<(), ProviderError>;
}

/// JSON-over-HTTP plumbing shared by the remote backends.
#[derive(Clone)]
pub(crate) struct HttpClient {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl HttpClient {
    pub(crate) fn new(api_key: Option<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client, api_key })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    pub(crate) async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let req = self.authorize(self.client.post(url)).json(body);
        Self::send(url, req).await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderError> {
        let req = self.authorize(self.client.get(url));
        Self::send(url, req).await
    }

    async fn send<T: DeserializeOwned>(
        url: &str,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            return Err(ProviderError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(url, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ProviderError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

/// Upstream error bodies are cut to this many bytes.
pub const MAX_ERROR_BODY: usize = 2048;

/// Read at most [`MAX_ERROR_BODY`] bytes of an error response.
async fn error_body(mut response: reqwest::Response) -> String {
    let mut buf = Vec::new();
    while buf.len() <= MAX_ERROR_BODY {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    let truncated = buf.len() > MAX_ERROR_BODY;
    buf.truncate(MAX_ERROR_BODY);
    let mut body = String::from_utf8_lossy(&buf).into_owned();
    if truncated {
        body.push_str("...");
    }
    body
}
