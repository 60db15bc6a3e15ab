//! Builds the active provider of each category from stored configuration.
//!
//! The active configuration is looked up on every call, so activating a
//! different provider takes effect on the next request without a restart.
//! No active provider is `Ok(None)`, not an error; the caller decides
//! whether that is fatal.

use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use super::embedding::{HttpEmbeddingSettings, NoopEmbeddingSettings};
use super::llm::{NoopLlmSettings, OpenAiLlmSettings};
use super::{
    EmbeddingProvider, HttpEmbeddingProvider, LlmProvider, NoopEmbeddingProvider,
    NoopLlmProvider, OpenAiLlmProvider, ProviderError,
};
use ragbridge_core::models::{Pagination, ProviderCategory, ProviderConfig, ProviderFilter};
use ragbridge_core::store::ProviderStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Noop,
    Http,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingKind::Noop => "noop",
            EmbeddingKind::Http => "http",
        }
    }
}

impl FromStr for EmbeddingKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noop" => Ok(EmbeddingKind::Noop),
            "http" => Ok(EmbeddingKind::Http),
            other => Err(ProviderError::UnsupportedType {
                category: ProviderCategory::Embedding,
                provider_type: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EmbeddingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmKind {
    Noop,
    OpenAi,
}

impl LlmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmKind::Noop => "noop",
            LlmKind::OpenAi => "openai",
        }
    }
}

impl FromStr for LlmKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noop" => Ok(LlmKind::Noop),
            "openai" => Ok(LlmKind::OpenAi),
            other => Err(ProviderError::UnsupportedType {
                category: ProviderCategory::Llm,
                provider_type: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for LlmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn settings<T: DeserializeOwned>(
    config: &ProviderConfig,
    provider_type: &'static str,
) -> Result<T, ProviderError> {
    serde_json::from_value(config.settings.clone()).map_err(|e| ProviderError::InvalidSettings {
        category: config.category,
        id: config.id.clone(),
        provider_type,
        message: e.to_string(),
    })
}

/// Construct an embedding backend from a configuration. Makes no network
/// calls, so it doubles as settings validation.
pub fn build_embedding_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let kind: EmbeddingKind = config.provider_type.parse()?;
    let provider: Arc<dyn EmbeddingProvider> = match kind {
        EmbeddingKind::Noop => {
            let s: NoopEmbeddingSettings = settings(config, kind.as_str())?;
            Arc::new(NoopEmbeddingProvider::new(&config.id, s))
        }
        EmbeddingKind::Http => {
            let s: HttpEmbeddingSettings = settings(config, kind.as_str())?;
            Arc::new(HttpEmbeddingProvider::new(&config.id, s, timeout)?)
        }
    };
    Ok(provider)
}

pub fn build_llm_provider(
    config: &ProviderConfig,
    timeout: Duration,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    let kind: LlmKind = config.provider_type.parse()?;
    let provider: Arc<dyn LlmProvider> = match kind {
        LlmKind::Noop => {
            let s: NoopLlmSettings = settings(config, kind.as_str())?;
            Arc::new(NoopLlmProvider::new(&config.id, s))
        }
        LlmKind::OpenAi => {
            let s: OpenAiLlmSettings = settings(config, kind.as_str())?;
            Arc::new(OpenAiLlmProvider::new(&config.id, s, timeout)?)
        }
    };
    Ok(provider)
}

/// Validate a configuration for either category.
pub fn validate(config: &ProviderConfig, timeout: Duration) -> Result<(), ProviderError> {
    match config.category {
        ProviderCategory::Embedding => build_embedding_provider(config, timeout).map(|_| ()),
        ProviderCategory::Llm => build_llm_provider(config, timeout).map(|_| ()),
    }
}

pub struct ProviderFactory<S: ProviderStore + ?Sized> {
    store: Arc<S>,
    timeout: Duration,
}

impl<S: ProviderStore + ?Sized> Clone for ProviderFactory<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            timeout: self.timeout,
        }
    }
}

impl<S: ProviderStore + ?Sized> ProviderFactory<S> {
    pub fn new(store: Arc<S>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn active(
        &self,
        category: ProviderCategory,
    ) -> Result<Option<ProviderConfig>, ProviderError> {
        let page = self
            .store
            .list_providers(category, ProviderFilter::active(), Pagination::new(1, 1))
            .await
            .map_err(|error| ProviderError::ConfigStore { category, error })?;
        Ok(page.items.into_iter().next())
    }

    pub async fn embedding(&self) -> Result<Option<Arc<dyn EmbeddingProvider>>, ProviderError> {
        match self.active(ProviderCategory::Embedding).await? {
            Some(config) => build_embedding_provider(&config, self.timeout).map(Some),
            None => Ok(None),
        }
    }

    pub async fn llm(&self) -> Result<Option<Arc<dyn LlmProvider>>, ProviderError> {
        match self.active(ProviderCategory::Llm).await? {
            Some(config) => build_llm_provider(&config, self.timeout).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragbridge_core::models::ProviderStatus;
    use serde_json::json;

    fn config(
        category: ProviderCategory,
        provider_type: &str,
        settings: serde_json::Value,
    ) -> ProviderConfig {
        ProviderConfig {
            id: "p1".into(),
            category,
            name: "test".into(),
            provider_type: provider_type.into(),
            status: ProviderStatus::Active,
            settings,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_both_categories_reject_unknown_tags_alike() {
        let t = Duration::from_secs(1);
        let e =
            build_embedding_provider(&config(ProviderCategory::Embedding, "cohere", json!({})), t)
                .err()
                .unwrap();
        let l = build_llm_provider(&config(ProviderCategory::Llm, "cohere", json!({})), t)
            .err()
            .unwrap();
        assert!(matches!(
            e,
            ProviderError::UnsupportedType {
                category: ProviderCategory::Embedding,
                ..
            }
        ));
        assert!(matches!(
            l,
            ProviderError::UnsupportedType {
                category: ProviderCategory::Llm,
                ..
            }
        ));
    }

    #[test]
    fn test_settings_for_other_type_rejected() {
        let err = build_embedding_provider(
            &config(
                ProviderCategory::Embedding,
                "noop",
                json!({"endpoint": "http://x", "model": "m"}),
            ),
            Duration::from_secs(1),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            ProviderError::InvalidSettings {
                provider_type: "noop",
                ..
            }
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_valid_configs_build() {
        let t = Duration::from_secs(1);
        let http = json!({"endpoint": "http://x/embeddings", "model": "m"});
        validate(&config(ProviderCategory::Embedding, "http", http), t).unwrap();
        let openai = json!({"model": "m", "api_key": "k"});
        validate(&config(ProviderCategory::Llm, "openai", openai), t).unwrap();
        validate(&config(ProviderCategory::Llm, "noop", json!({"response": "ok"})), t).unwrap();
    }
}
