//! Retrieval-augmented chat over stored documents.
//!
//! [`InteractionManager::send_message`] runs one turn as a strict sequence:
//!
//! 1. validate the message and resolve the interaction;
//! 2. build the active LLM provider;
//! 3. persist the user turn;
//! 4. embed the query with the active embedding provider and search;
//! 5. take the ranked hits as context (already bounded by the search limit);
//! 6. render the prompt (history is left empty);
//! 7. call the LLM;
//! 8. persist the system turn and return it.
//!
//! The first failing step ends the turn. A failure after step 3 leaves the
//! user turn in place without a reply; readers of an interaction must
//! accept trailing unanswered user turns.

use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::prompt::PromptTemplate;
use crate::provider::{ProviderError, ProviderFactory};
use ragbridge_core::models::{
    Conversation, Interaction, Page, Pagination, ProviderCategory, Role, SearchConfig,
    SearchFilters,
};
use ragbridge_core::store::{InteractionStore, SearchIndex, Storage};

#[derive(Debug, thiserror::Error)]
pub enum InteractionError {
    #[error("interaction '{0}' not found")]
    NotFound(String),
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("no active {0} provider configured")]
    NoActiveProvider(ProviderCategory),
    #[error("{context}: {error}")]
    Provider {
        context: &'static str,
        error: ProviderError,
    },
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("request was cancelled")]
    Cancelled,
}

impl InteractionError {
    fn provider(context: &'static str) -> impl FnOnce(ProviderError) -> Self {
        move |error| InteractionError::Provider { context, error }
    }
}

pub struct InteractionManager {
    store: Arc<dyn Storage>,
    providers: ProviderFactory<dyn Storage>,
    search_limit: u32,
    template: PromptTemplate,
}

impl InteractionManager {
    pub fn new(
        store: Arc<dyn Storage>,
        providers: ProviderFactory<dyn Storage>,
        search_limit: u32,
        template: PromptTemplate,
    ) -> Self {
        Self {
            store,
            providers,
            search_limit: search_limit.max(1),
            template,
        }
    }

    pub fn from_config(store: Arc<dyn Storage>, config: &Config) -> Self {
        let providers = ProviderFactory::new(store.clone(), config.providers.timeout());
        Self::new(
            store,
            providers,
            config.retrieval.search_limit,
            PromptTemplate::from_config(config.retrieval.prompt_template.as_deref()),
        )
    }

    pub fn providers(&self) -> &ProviderFactory<dyn Storage> {
        &self.providers
    }

    pub async fn create_interaction(&self, query: &str) -> Result<Interaction, InteractionError> {
        let interaction = self
            .store
            .create_interaction(&Interaction::new(query))
            .await
            .map_err(InteractionError::Storage)?;
        info!(interaction_id = %interaction.id, "interaction created");
        Ok(interaction)
    }

    pub async fn list_interactions(
        &self,
        page: Pagination,
    ) -> Result<Page<Interaction>, InteractionError> {
        self.store
            .list_interactions(page)
            .await
            .map_err(InteractionError::Storage)
    }

    pub async fn get_interaction(&self, id: &str) -> Result<Interaction, InteractionError> {
        self.store
            .get_interaction(id)
            .await
            .map_err(InteractionError::Storage)?
            .ok_or_else(|| InteractionError::NotFound(id.to_string()))
    }

    /// Answer one user message. Returns the persisted system turn.
    pub async fn send_message(
        &self,
        interaction_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Conversation, InteractionError> {
        let result = self.turn(interaction_id, message, cancel).await;
        if let Err(ref e) = result {
            warn!(interaction_id, error = %e, "message turn failed");
        }
        result
    }

    async fn turn(
        &self,
        interaction_id: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<Conversation, InteractionError> {
        let query = message.trim();
        if query.is_empty() {
            return Err(InteractionError::EmptyMessage);
        }
        self.get_interaction(interaction_id).await?;

        let llm = until_cancelled(cancel, self.providers.llm())
            .await?
            .map_err(InteractionError::provider("failed to initialize LLM provider"))?
            .ok_or(InteractionError::NoActiveProvider(ProviderCategory::Llm))?;

        until_cancelled(
            cancel,
            self.store.add_conversation(interaction_id, Role::User, message),
        )
        .await?
        .map_err(InteractionError::Storage)?;

        let embedder = until_cancelled(cancel, self.providers.embedding())
            .await?
            .map_err(InteractionError::provider("failed to initialize embedding provider"))?
            .ok_or(InteractionError::NoActiveProvider(ProviderCategory::Embedding))?;

        let parts = until_cancelled(cancel, embedder.get_embedding(query))
            .await?
            .map_err(InteractionError::provider("failed to embed query"))?;
        let vector = parts
            .into_iter()
            .next()
            .map(|p| p.vector)
            .ok_or_else(|| InteractionError::Provider {
                context: "failed to embed query",
                error: ProviderError::EmptyResponse(embedder.id().to_string()),
            })?;

        let search = SearchConfig {
            query_text: query.to_string(),
            embedding: Some(vector),
            filters: SearchFilters::default(),
            limit: self.search_limit,
            page: 1,
        };
        let results = until_cancelled(cancel, self.store.search(&search))
            .await?
            .map_err(InteractionError::Storage)?;
        debug!(
            interaction_id,
            hits = results.hits.len(),
            total = results.total,
            "context retrieved"
        );

        let prompt = self.template.render(query, &results.hits, &[]);

        let answer = until_cancelled(cancel, llm.generate(&prompt))
            .await?
            .map_err(InteractionError::provider("failed to generate response"))?;

        let reply = until_cancelled(
            cancel,
            self.store
                .add_conversation(interaction_id, Role::System, &answer),
        )
        .await?
        .map_err(InteractionError::Storage)?;

        info!(
            interaction_id,
            llm_provider = llm.id(),
            embedding_provider = embedder.id(),
            context_documents = results.hits.len(),
            "message answered"
        );
        Ok(reply)
    }
}

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, InteractionError> {
    tokio::select! {
        out = fut => Ok(out),
        _ = cancel.cancelled() => Err(InteractionError::Cancelled),
    }
}

/// `ragbridge ask <interaction-id|new> <message>`.
pub async fn run_ask(config: &Config, interaction: &str, message: &str) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    let store: Arc<dyn Storage> = Arc::new(crate::sqlite_store::SqliteStorage::new(pool));
    let manager = InteractionManager::from_config(store, config);

    let interaction_id = if interaction == "new" {
        let created = manager.create_interaction(message).await?;
        eprintln!("interaction {}", created.id);
        created.id
    } else {
        interaction.to_string()
    };

    let reply = manager
        .send_message(&interaction_id, message, &CancellationToken::new())
        .await?;
    println!("{}", reply.text);
    Ok(())
}
