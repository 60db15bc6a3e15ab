//! In-memory [`Storage`](super::Storage) implementation for tests and
//! offline runs.
//!
//! Uses `HashMap`/`Vec` behind `std::sync::RwLock`. Search delegates to
//! [`crate::search::rank`] over every stored document. Every trait call
//! bumps an operation counter so callers can assert that a code path never
//! touched storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{
    Conversation, DatasourceRecord, DatasourceState, Document, Embedding, Interaction, Page,
    Pagination, ProviderCategory, ProviderConfig, ProviderFilter, ProviderStatus, Role,
    SearchConfig, SearchResults,
};

use super::{DatasourceStore, InteractionStore, ProviderStore, SearchIndex};

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStorage {
    datasources: RwLock<HashMap<String, DatasourceRecord>>,
    // insertion order doubles as "oldest first" for pending embeddings
    documents: RwLock<Vec<Document>>,
    providers: RwLock<Vec<ProviderConfig>>,
    interactions: RwLock<Vec<Interaction>>,
    operations: AtomicUsize,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of storage calls made so far.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored document.
    pub fn document(&self, id: &str) -> Option<Document> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// Number of stored documents.
    pub fn document_count(&self) -> usize {
        self.documents.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatasourceStore for InMemoryStorage {
    async fn create_datasource(&self, record: &DatasourceRecord) -> Result<()> {
        self.touch();
        let mut map = self.datasources.write().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(&record.id) {
            bail!("datasource already exists: {}", record.id);
        }
        map.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn list_datasources(&self) -> Result<Vec<DatasourceRecord>> {
        self.touch();
        let mut all: Vec<DatasourceRecord> =
            self.datasources.read().unwrap_or_else(|e| e.into_inner()).values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn get_datasource(&self, id: &str) -> Result<Option<DatasourceRecord>> {
        self.touch();
        Ok(self.datasources.read().unwrap_or_else(|e| e.into_inner()).get(id).cloned())
    }

    async fn update_datasource(
        &self,
        id: &str,
        settings: &serde_json::Value,
        state: &DatasourceState,
    ) -> Result<()> {
        self.touch();
        let mut map = self.datasources.write().unwrap_or_else(|e| e.into_inner());
        let record = map
            .get_mut(id)
            .ok_or_else(|| anyhow!("datasource not found: {}", id))?;
        record.settings = settings.clone();
        record.state = state.clone();
        Ok(())
    }

    async fn store(&self, document: &Document) -> Result<()> {
        self.touch();
        let mut docs = self.documents.write().unwrap_or_else(|e| e.into_inner());
        match docs.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document.clone(),
            None => docs.push(document.clone()),
        }
        Ok(())
    }

    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<Document>> {
        self.touch();
        Ok(self
            .documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|d| d.embedding.is_empty())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_embedding(&self, document_id: &str, embedding: &Embedding) -> Result<()> {
        self.touch();
        let mut docs = self.documents.write().unwrap_or_else(|e| e.into_inner());
        let doc = docs
            .iter_mut()
            .find(|d| d.id == document_id)
            .ok_or_else(|| anyhow!("document not found: {}", document_id))?;
        doc.embedding = embedding.clone();
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for InMemoryStorage {
    async fn list_providers(
        &self,
        category: ProviderCategory,
        filter: ProviderFilter,
        page: Pagination,
    ) -> Result<Page<ProviderConfig>> {
        self.touch();
        let mut matching: Vec<ProviderConfig> = self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| p.category == category)
            .filter(|p| filter.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len() as u64;
        Ok(Page {
            items: page.apply(matching),
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn get_provider(
        &self,
        category: ProviderCategory,
        id: &str,
    ) -> Result<Option<ProviderConfig>> {
        self.touch();
        Ok(self
            .providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|p| p.category == category && p.id == id)
            .cloned())
    }

    async fn create_provider(&self, config: &ProviderConfig) -> Result<()> {
        self.touch();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        if providers.iter().any(|p| p.id == config.id) {
            bail!("provider already exists: {}", config.id);
        }
        if config.status == ProviderStatus::Active {
            for p in providers.iter_mut().filter(|p| p.category == config.category) {
                p.status = ProviderStatus::Inactive;
            }
        }
        providers.push(config.clone());
        Ok(())
    }

    async fn update_provider(&self, config: &ProviderConfig) -> Result<bool> {
        self.touch();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        match providers
            .iter_mut()
            .find(|p| p.category == config.category && p.id == config.id)
        {
            Some(existing) => {
                existing.name = config.name.clone();
                existing.provider_type = config.provider_type.clone();
                existing.settings = config.settings.clone();
                existing.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_provider(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        self.touch();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        let before = providers.len();
        providers.retain(|p| !(p.category == category && p.id == id));
        Ok(providers.len() != before)
    }

    async fn set_active(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        self.touch();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        if !providers.iter().any(|p| p.category == category && p.id == id) {
            return Ok(false);
        }
        let now = Utc::now();
        for p in providers.iter_mut().filter(|p| p.category == category) {
            let status = if p.id == id {
                ProviderStatus::Active
            } else {
                ProviderStatus::Inactive
            };
            if p.status != status {
                p.status = status;
                p.updated_at = now;
            }
        }
        Ok(true)
    }

    async fn set_inactive(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        self.touch();
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        match providers
            .iter_mut()
            .find(|p| p.category == category && p.id == id)
        {
            Some(p) => {
                p.status = ProviderStatus::Inactive;
                p.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl InteractionStore for InMemoryStorage {
    async fn create_interaction(&self, interaction: &Interaction) -> Result<Interaction> {
        self.touch();
        let mut interactions = self.interactions.write().unwrap_or_else(|e| e.into_inner());
        if interactions.iter().any(|i| i.id == interaction.id) {
            bail!("interaction already exists: {}", interaction.id);
        }
        interactions.push(interaction.clone());
        Ok(interaction.clone())
    }

    async fn add_conversation(
        &self,
        interaction_id: &str,
        role: Role,
        text: &str,
    ) -> Result<Conversation> {
        self.touch();
        let mut interactions = self.interactions.write().unwrap_or_else(|e| e.into_inner());
        let interaction = interactions
            .iter_mut()
            .find(|i| i.id == interaction_id)
            .ok_or_else(|| anyhow!("interaction not found: {}", interaction_id))?;
        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            interaction_id: interaction_id.to_string(),
            role,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        interaction.conversations.push(conversation.clone());
        Ok(conversation)
    }

    async fn list_interactions(&self, page: Pagination) -> Result<Page<Interaction>> {
        self.touch();
        let mut all: Vec<Interaction> = self
            .interactions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .map(|i| Interaction {
                conversations: Vec::new(),
                ..i.clone()
            })
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as u64;
        Ok(Page {
            items: page.apply(all),
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>> {
        self.touch();
        Ok(self
            .interactions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }
}

#[async_trait]
impl SearchIndex for InMemoryStorage {
    async fn search(&self, config: &SearchConfig) -> Result<SearchResults> {
        self.touch();
        let docs = self.documents.read().unwrap_or_else(|e| e.into_inner());
        Ok(crate::search::rank(docs.iter(), config))
    }
}
