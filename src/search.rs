//! Document search shared by `POST /api/v1/search` and `ragbridge search`.
//!
//! The query is embedded with the active embedding provider when there is
//! one and ranked by vector similarity. With no active embedding provider
//! the search falls back to keyword ranking.

use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::provider::{ProviderError, ProviderFactory};
use crate::sqlite_store::SqliteStorage;
use ragbridge_core::models::{SearchConfig, SearchFilters, SearchResults};
use ragbridge_core::store::{ProviderStore, SearchIndex};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub page: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("failed to embed query: {0}")]
    Provider(#[from] ProviderError),
    #[error("search failed: {0:#}")]
    Storage(anyhow::Error),
}

pub async fn search_documents<S>(
    store: &S,
    providers: &ProviderFactory<S>,
    request: &SearchRequest,
    default_limit: u32,
) -> Result<SearchResults, SearchError>
where
    S: SearchIndex + ProviderStore + ?Sized,
{
    let query = request.query.trim();
    if query.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    let embedding = match providers.embedding().await? {
        Some(provider) => provider
            .get_embedding(query)
            .await?
            .into_iter()
            .next()
            .map(|part| part.vector),
        None => {
            tracing::debug!("no active embedding provider, using keyword search");
            None
        }
    };

    let config = SearchConfig {
        query_text: query.to_string(),
        embedding,
        filters: request.filters.clone(),
        limit: request.limit.unwrap_or(default_limit).max(1),
        page: request.page.unwrap_or(1).max(1),
    };
    store.search(&config).await.map_err(SearchError::Storage)
}

/// `ragbridge search <query>`.
pub async fn run_search(
    config: &Config,
    query: &str,
    datasource: Option<String>,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStorage::new(pool));
    let providers = ProviderFactory::new(store.clone(), config.providers.timeout());

    let request = SearchRequest {
        query: query.to_string(),
        filters: SearchFilters {
            datasource_id: datasource,
            source_type: None,
        },
        limit,
        page: None,
    };
    let results =
        search_documents(store.as_ref(), &providers, &request, config.retrieval.search_limit)
            .await?;

    if results.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in results.hits.iter().enumerate() {
        let title = hit.title.as_deref().unwrap_or("(untitled)");
        let source = hit
            .source
            .as_ref()
            .map(|s| s.name.as_str())
            .unwrap_or("-");
        println!("{}. [{:.3}] {} ({})", i + 1, hit.score, title, source);
        println!("    id: {}", hit.document_id);
        let snippet: String = hit.text.chars().take(200).collect();
        println!("    {}", snippet.replace('\n', " "));
    }
    println!("{} of {} matches", results.hits.len(), results.total);
    Ok(())
}
