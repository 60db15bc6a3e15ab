//! Core data models shared by the collector, the providers, and the
//! retrieval-augmented chat flow.
//!
//! Every type here is plain data: serializable, cloneable, and free of any
//! runtime or database dependency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════
// Documents
// ═══════════════════════════════════════════════════════════════════════

/// One embedded unit of text with its vector and provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    /// Source text that was embedded.
    pub text: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Id of the provider configuration that produced the vector.
    pub provider_id: String,
    /// Prompt tokens consumed to produce the vector.
    pub token_count: u32,
    /// When the vector was generated.
    pub generated_at: DateTime<Utc>,
}

/// The embedding record of a document: zero or more content parts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub parts: Vec<ContentPart>,
}

impl Embedding {
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Where a document came from. Attached by the collector at ingestion time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub datasource_id: String,
    pub name: String,
    pub source_type: String,
}

/// A document ingested from a datasource.
///
/// Datasources produce documents with `source` and `fetched_at` unset; the
/// collector fills both in before storing. Once stored, only the
/// `embedding` field is rewritten (re-embedding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub body: String,
    #[serde(default)]
    pub source: Option<SourceAttribution>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub embedding: Embedding,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

impl Document {
    /// A bare document as a datasource would return it.
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            body: body.into(),
            source: None,
            fetched_at: None,
            metadata: empty_object(),
            embedding: Embedding::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Datasources
// ═══════════════════════════════════════════════════════════════════════

/// Opaque cursor owned by a datasource implementation.
///
/// `Null` means the datasource has never completed a collection run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasourceState(pub serde_json::Value);

impl DatasourceState {
    pub fn empty() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// A configured datasource as persisted by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceRecord {
    pub id: String,
    pub name: String,
    pub source_type: String,
    pub settings: serde_json::Value,
    #[serde(default)]
    pub state: DatasourceState,
}

// ═══════════════════════════════════════════════════════════════════════
// Provider configuration
// ═══════════════════════════════════════════════════════════════════════

/// Which family of backend a provider configuration belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCategory {
    Embedding,
    Llm,
}

impl ProviderCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderCategory::Embedding => "embedding",
            ProviderCategory::Llm => "llm",
        }
    }
}

impl fmt::Display for ProviderCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "embedding" => Ok(ProviderCategory::Embedding),
            "llm" => Ok(ProviderCategory::Llm),
            other => anyhow::bail!("unknown provider category: '{}'", other),
        }
    }
}

/// Whether a provider configuration is the one currently in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Active,
    Inactive,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "active",
            ProviderStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for ProviderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "active" => Ok(ProviderStatus::Active),
            "inactive" => Ok(ProviderStatus::Inactive),
            other => anyhow::bail!("unknown provider status: '{}'", other),
        }
    }
}

/// A persisted embedding or LLM provider configuration.
///
/// `settings` is the type-specific payload; its shape is only checked when
/// the provider factory turns the configuration into a live backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub category: ProviderCategory,
    pub name: String,
    pub provider_type: String,
    pub status: ProviderStatus,
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for provider listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFilter {
    pub status: Option<ProviderStatus>,
}

impl ProviderFilter {
    pub fn active() -> Self {
        Self {
            status: Some(ProviderStatus::Active),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Pagination
// ═══════════════════════════════════════════════════════════════════════

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// Number of items to skip.
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.per_page as usize
    }

    /// Slice an already-sorted collection down to this page.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items
            .into_iter()
            .skip(self.offset())
            .take(self.per_page as usize)
            .collect()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// One page of a listing plus the total number of matching items.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

// ═══════════════════════════════════════════════════════════════════════
// Interactions
// ═══════════════════════════════════════════════════════════════════════

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::System => "system",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "user" => Ok(Role::User),
            "system" => Ok(Role::System),
            other => anyhow::bail!("unknown conversation role: '{}'", other),
        }
    }
}

/// One message within an interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub interaction_id: String,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A query thread: the original query and its ordered turns.
///
/// Trailing user turns without a system reply are expected when a
/// downstream step failed after the user turn was persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub query: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

impl Interaction {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query: query.into(),
            created_at: Utc::now(),
            conversations: Vec::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Search
// ═══════════════════════════════════════════════════════════════════════

/// Optional narrowing of a search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub datasource_id: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

/// A query descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub query_text: String,
    /// Query embedding; `None` falls back to keyword matching.
    pub embedding: Option<Vec<f32>>,
    pub filters: SearchFilters,
    pub limit: u32,
    /// 1-based page.
    pub page: u32,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub document_id: String,
    pub title: Option<String>,
    pub source: Option<SourceAttribution>,
    /// Text of the best-matching content part, or the body for keyword hits.
    pub text: String,
    pub score: f64,
}

/// Ranked results for a [`SearchConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Matches before pagination.
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(1, 10).offset(), 0);
        assert_eq!(Pagination::new(3, 10).offset(), 20);
        // page 0 is clamped to the first page
        assert_eq!(Pagination::new(0, 10).offset(), 0);
    }

    #[test]
    fn test_pagination_apply() {
        let items: Vec<u32> = (0..25).collect();
        assert_eq!(Pagination::new(3, 10).apply(items.clone()), vec![20, 21, 22, 23, 24]);
        assert!(Pagination::new(4, 10).apply(items).is_empty());
    }

    #[test]
    fn test_status_and_role_strings() {
        assert_eq!("active".parse::<ProviderStatus>().unwrap(), ProviderStatus::Active);
        assert!("enabled".parse::<ProviderStatus>().is_err());
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn test_document_defaults_from_json() {
        let doc: Document = serde_json::from_str(r#"{"id":"d1","body":"hello"}"#).unwrap();
        assert!(doc.source.is_none());
        assert!(doc.embedding.is_empty());
        assert_eq!(doc.metadata, serde_json::json!({}));
    }

    #[test]
    fn test_state_empty() {
        assert!(DatasourceState::empty().is_empty());
        assert!(!DatasourceState(serde_json::json!({"cursor": 1})).is_empty());
    }
}
