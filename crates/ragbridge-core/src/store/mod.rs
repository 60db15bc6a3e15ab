//! Storage contract consumed by the collector, the provider factory, and
//! the interaction manager.
//!
//! The contract is split into four focused traits so each component can
//! depend on exactly the slice it uses (and tests can fake a small trait
//! instead of the whole backend). [`Storage`] is the union, implemented
//! automatically for anything that implements all four.
//!
//! | Trait | Used by |
//! |-------|---------|
//! | [`DatasourceStore`] | collector worker, embedding backfill |
//! | [`ProviderStore`] | provider factory, provider HTTP routes |
//! | [`InteractionStore`] | interaction manager |
//! | [`SearchIndex`] | interaction manager, search route |
//!
//! Missing rows are reported as `Ok(None)`; `Err` is reserved for backend
//! failures. No operation spans a transaction with another one.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    Conversation, DatasourceRecord, DatasourceState, Document, Embedding, Interaction, Page,
    Pagination, ProviderCategory, ProviderConfig, ProviderFilter, Role, SearchConfig,
    SearchResults,
};

/// Datasource cursors and the documents collected from them.
#[async_trait]
pub trait DatasourceStore: Send + Sync {
    /// Register a datasource. Fails if the id already exists.
    async fn create_datasource(&self, record: &DatasourceRecord) -> Result<()>;

    /// All registered datasources, ordered by id.
    async fn list_datasources(&self) -> Result<Vec<DatasourceRecord>>;

    /// Load a datasource's settings and persisted state.
    async fn get_datasource(&self, id: &str) -> Result<Option<DatasourceRecord>>;

    /// Replace settings and state together in a single update.
    async fn update_datasource(
        &self,
        id: &str,
        settings: &serde_json::Value,
        state: &DatasourceState,
    ) -> Result<()>;

    /// Insert or replace a document, including its content parts.
    async fn store(&self, document: &Document) -> Result<()>;

    /// Documents that have no content parts yet, oldest first.
    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<Document>>;

    /// Replace a stored document's embedding record.
    async fn update_embedding(&self, document_id: &str, embedding: &Embedding) -> Result<()>;
}

/// Embedding and LLM provider configurations.
///
/// Implementations enforce that at most one provider per category is
/// `active`: [`set_active`](ProviderStore::set_active) deactivates the
/// others in the same category.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    async fn list_providers(
        &self,
        category: ProviderCategory,
        filter: ProviderFilter,
        page: Pagination,
    ) -> Result<Page<ProviderConfig>>;

    async fn get_provider(
        &self,
        category: ProviderCategory,
        id: &str,
    ) -> Result<Option<ProviderConfig>>;

    async fn create_provider(&self, config: &ProviderConfig) -> Result<()>;

    /// Update name, type and settings. Returns `false` if no such provider.
    async fn update_provider(&self, config: &ProviderConfig) -> Result<bool>;

    /// Returns `false` if no such provider.
    async fn delete_provider(&self, category: ProviderCategory, id: &str) -> Result<bool>;

    /// Mark a provider active and every other provider of its category
    /// inactive. Returns `false` if no such provider.
    async fn set_active(&self, category: ProviderCategory, id: &str) -> Result<bool>;

    /// Returns `false` if no such provider.
    async fn set_inactive(&self, category: ProviderCategory, id: &str) -> Result<bool>;
}

/// Interactions and their conversation turns.
#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn create_interaction(&self, interaction: &Interaction) -> Result<Interaction>;

    /// Append a turn. Fails if the interaction does not exist.
    async fn add_conversation(
        &self,
        interaction_id: &str,
        role: Role,
        text: &str,
    ) -> Result<Conversation>;

    /// Newest first, without conversations.
    async fn list_interactions(&self, page: Pagination) -> Result<Page<Interaction>>;

    /// The interaction with its turns in insertion order.
    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>>;
}

/// Similarity search over stored documents.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, config: &SearchConfig) -> Result<SearchResults>;
}

/// The full storage contract.
pub trait Storage: DatasourceStore + ProviderStore + InteractionStore + SearchIndex {}

impl<T> Storage for T where T: DatasourceStore + ProviderStore + InteractionStore + SearchIndex {}
