//! SQLite-backed [`Storage`](ragbridge_core::store::Storage) implementation.
//!
//! Timestamps are stored as unix milliseconds. Content-part vectors are
//! little-endian `f32` BLOBs. Search loads candidate documents (with
//! filters pushed into SQL) and ranks them with
//! [`ragbridge_core::search::rank`], the same algorithm the in-memory
//! backend uses.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use ragbridge_core::embedding::{blob_to_vec, vec_to_blob};
use ragbridge_core::models::{
    ContentPart, Conversation, DatasourceRecord, DatasourceState, Document, Embedding,
    Interaction, Page, Pagination, ProviderCategory, ProviderConfig, ProviderFilter,
    ProviderStatus, Role, SearchConfig, SearchResults, SourceAttribution,
};
use ragbridge_core::store::{DatasourceStore, InteractionStore, ProviderStore, SearchIndex};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_parts(
        &self,
        document_ids: &[String],
    ) -> Result<HashMap<String, Vec<ContentPart>>> {
        let mut parts: HashMap<String, Vec<ContentPart>> = HashMap::new();
        if document_ids.is_empty() {
            return Ok(parts);
        }

        // SQLite caps bound parameters; stay well below the limit.
        for ids in document_ids.chunks(500) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT document_id, text, embedding, provider_id, token_count, generated_at \
                 FROM content_parts WHERE document_id IN (",
            );
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id);
            }
            separated.push_unseparated(") ORDER BY document_id, part_index");

            for row in qb.build().fetch_all(&self.pool).await? {
                let blob: Vec<u8> = row.get("embedding");
                let token_count: i64 = row.get("token_count");
                parts
                    .entry(row.get("document_id"))
                    .or_default()
                    .push(ContentPart {
                        text: row.get("text"),
                        vector: blob_to_vec(&blob),
                        provider_id: row.get("provider_id"),
                        token_count: token_count.max(0) as u32,
                        generated_at: from_millis(row.get("generated_at")),
                    });
            }
        }
        Ok(parts)
    }

    async fn documents_with_parts(&self, rows: Vec<SqliteRow>) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = rows.iter().map(document_from_row).collect::<Result<_>>()?;
        let ids: Vec<String> = docs.iter().map(|d| d.id.clone()).collect();
        let mut parts = self.load_parts(&ids).await?;
        for doc in &mut docs {
            if let Some(p) = parts.remove(&doc.id) {
                doc.embedding = Embedding { parts: p };
            }
        }
        Ok(docs)
    }

    async fn write_parts(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        document_id: &str,
        embedding: &Embedding,
    ) -> Result<()> {
        sqlx::query("DELETE FROM content_parts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut **tx)
            .await?;

        for (i, part) in embedding.parts.iter().enumerate() {
            sqlx::query(
                "INSERT INTO content_parts (document_id, part_index, text, embedding, provider_id, token_count, generated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(i as i64)
            .bind(&part.text)
            .bind(vec_to_blob(&part.vector))
            .bind(&part.provider_id)
            .bind(part.token_count as i64)
            .bind(part.generated_at.timestamp_millis())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("corrupt {} column", what))
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let datasource_id: Option<String> = row.get("datasource_id");
    let source = match datasource_id {
        Some(datasource_id) => Some(SourceAttribution {
            datasource_id,
            name: row.get::<Option<String>, _>("datasource_name").unwrap_or_default(),
            source_type: row.get::<Option<String>, _>("source_type").unwrap_or_default(),
        }),
        None => None,
    };
    let metadata: String = row.get("metadata_json");
    Ok(Document {
        id: row.get("id"),
        title: row.get("title"),
        body: row.get("body"),
        source,
        fetched_at: row.get::<Option<i64>, _>("fetched_at").map(from_millis),
        metadata: parse_json(&metadata, "documents.metadata_json")?,
        embedding: Embedding::default(),
    })
}

fn datasource_from_row(row: &SqliteRow) -> Result<DatasourceRecord> {
    let settings: String = row.get("settings_json");
    let state: String = row.get("state_json");
    Ok(DatasourceRecord {
        id: row.get("id"),
        name: row.get("name"),
        source_type: row.get("source_type"),
        settings: parse_json(&settings, "datasources.settings_json")?,
        state: DatasourceState(parse_json(&state, "datasources.state_json")?),
    })
}

fn provider_from_row(row: &SqliteRow) -> Result<ProviderConfig> {
    let category: String = row.get("category");
    let status: String = row.get("status");
    let settings: String = row.get("settings_json");
    Ok(ProviderConfig {
        id: row.get("id"),
        category: category.parse()?,
        name: row.get("name"),
        provider_type: row.get("provider_type"),
        status: status.parse()?,
        settings: parse_json(&settings, "providers.settings_json")?,
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

fn conversation_from_row(row: &SqliteRow) -> Result<Conversation> {
    let role: String = row.get("role");
    Ok(Conversation {
        id: row.get("id"),
        interaction_id: row.get("interaction_id"),
        role: role.parse()?,
        text: row.get("text"),
        created_at: from_millis(row.get("created_at")),
    })
}

const DOCUMENT_COLUMNS: &str =
    "id, title, body, datasource_id, datasource_name, source_type, fetched_at, metadata_json";

#[async_trait]
impl DatasourceStore for SqliteStorage {
    async fn create_datasource(&self, record: &DatasourceRecord) -> Result<()> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO datasources (id, name, source_type, settings_json, state_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.source_type)
        .bind(record.settings.to_string())
        .bind(record.state.0.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to create datasource {}", record.id))?;
        Ok(())
    }

    async fn list_datasources(&self) -> Result<Vec<DatasourceRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, source_type, settings_json, state_json FROM datasources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(datasource_from_row).collect()
    }

    async fn get_datasource(&self, id: &str) -> Result<Option<DatasourceRecord>> {
        let row = sqlx::query(
            "SELECT id, name, source_type, settings_json, state_json FROM datasources WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(datasource_from_row).transpose()
    }

    async fn update_datasource(
        &self,
        id: &str,
        settings: &serde_json::Value,
        state: &DatasourceState,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE datasources SET settings_json = ?, state_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(settings.to_string())
        .bind(state.0.to_string())
        .bind(now_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(anyhow!("datasource not found: {}", id));
        }
        Ok(())
    }

    async fn store(&self, document: &Document) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let source = document.source.as_ref();
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, body, datasource_id, datasource_name, source_type,
                                   fetched_at, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                datasource_id = excluded.datasource_id,
                datasource_name = excluded.datasource_name,
                source_type = excluded.source_type,
                fetched_at = excluded.fetched_at,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&document.id)
        .bind(&document.title)
        .bind(&document.body)
        .bind(source.map(|s| s.datasource_id.as_str()))
        .bind(source.map(|s| s.name.as_str()))
        .bind(source.map(|s| s.source_type.as_str()))
        .bind(document.fetched_at.map(|t| t.timestamp_millis()))
        .bind(document.metadata.to_string())
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;

        Self::write_parts(&mut tx, &document.id, &document.embedding).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn pending_embeddings(&self, limit: usize) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents d \
             WHERE NOT EXISTS (SELECT 1 FROM content_parts p WHERE p.document_id = d.id) \
             ORDER BY created_at, id LIMIT ?",
            DOCUMENT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn update_embedding(&self, document_id: &str, embedding: &Embedding) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let matches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_one(&mut *tx)
            .await?;
        if matches == 0 {
            return Err(anyhow!("document not found: {}", document_id));
        }
        Self::write_parts(&mut tx, document_id, embedding).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderStore for SqliteStorage {
    async fn list_providers(
        &self,
        category: ProviderCategory,
        filter: ProviderFilter,
        page: Pagination,
    ) -> Result<Page<ProviderConfig>> {
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM providers WHERE category = ? AND (? IS NULL OR status = ?)",
        )
        .bind(category.as_str())
        .bind(status)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(
            "SELECT id, category, name, provider_type, status, settings_json, created_at, updated_at \
             FROM providers WHERE category = ? AND (? IS NULL OR status = ?) \
             ORDER BY created_at, id LIMIT ? OFFSET ?",
        )
        .bind(category.as_str())
        .bind(status)
        .bind(status)
        .bind(page.per_page as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(Page {
            items: rows.iter().map(provider_from_row).collect::<Result<_>>()?,
            total: total as u64,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn get_provider(
        &self,
        category: ProviderCategory,
        id: &str,
    ) -> Result<Option<ProviderConfig>> {
        let row = sqlx::query(
            "SELECT id, category, name, provider_type, status, settings_json, created_at, updated_at \
             FROM providers WHERE category = ? AND id = ?",
        )
        .bind(category.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(provider_from_row).transpose()
    }

    async fn create_provider(&self, config: &ProviderConfig) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        if config.status == ProviderStatus::Active {
            sqlx::query(
                "UPDATE providers SET status = 'inactive', updated_at = ? \
                 WHERE category = ? AND status = 'active'",
            )
            .bind(now_millis())
            .bind(config.category.as_str())
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT INTO providers (id, category, name, provider_type, status, settings_json, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.id)
        .bind(config.category.as_str())
        .bind(&config.name)
        .bind(&config.provider_type)
        .bind(config.status.as_str())
        .bind(config.settings.to_string())
        .bind(config.created_at.timestamp_millis())
        .bind(config.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to create provider {}", config.id))?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_provider(&self, config: &ProviderConfig) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE providers SET name = ?, provider_type = ?, settings_json = ?, updated_at = ? \
             WHERE category = ? AND id = ?",
        )
        .bind(&config.name)
        .bind(&config.provider_type)
        .bind(config.settings.to_string())
        .bind(now_millis())
        .bind(config.category.as_str())
        .bind(&config.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_provider(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM providers WHERE category = ? AND id = ?")
            .bind(category.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_active(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let now = now_millis();

        let matches: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM providers WHERE category = ? AND id = ?")
                .bind(category.as_str())
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if matches == 0 {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE providers SET status = 'inactive', updated_at = ? \
             WHERE category = ? AND status = 'active' AND id != ?",
        )
        .bind(now)
        .bind(category.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE providers SET status = 'active', updated_at = ? WHERE category = ? AND id = ?",
        )
        .bind(now)
        .bind(category.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn set_inactive(&self, category: ProviderCategory, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE providers SET status = 'inactive', updated_at = ? WHERE category = ? AND id = ?",
        )
        .bind(now_millis())
        .bind(category.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl InteractionStore for SqliteStorage {
    async fn create_interaction(&self, interaction: &Interaction) -> Result<Interaction> {
        sqlx::query("INSERT INTO interactions (id, query, created_at) VALUES (?, ?, ?)")
            .bind(&interaction.id)
            .bind(&interaction.query)
            .bind(interaction.created_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(Interaction {
            conversations: Vec::new(),
            ..interaction.clone()
        })
    }

    async fn add_conversation(
        &self,
        interaction_id: &str,
        role: Role,
        text: &str,
    ) -> Result<Conversation> {
        let matches: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE id = ?")
            .bind(interaction_id)
            .fetch_one(&self.pool)
            .await?;
        if matches == 0 {
            return Err(anyhow!("interaction not found: {}", interaction_id));
        }

        let conversation = Conversation {
            id: uuid::Uuid::new_v4().to_string(),
            interaction_id: interaction_id.to_string(),
            role,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO conversations (id, interaction_id, role, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id)
        .bind(interaction_id)
        .bind(role.as_str())
        .bind(text)
        .bind(conversation.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(conversation)
    }

    async fn list_interactions(&self, page: Pagination) -> Result<Page<Interaction>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            "SELECT id, query, created_at FROM interactions ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(page.per_page as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(|r| Interaction {
                id: r.get("id"),
                query: r.get("query"),
                created_at: from_millis(r.get("created_at")),
                conversations: Vec::new(),
            })
            .collect();

        Ok(Page {
            items,
            total: total as u64,
            page: page.page,
            per_page: page.per_page,
        })
    }

    async fn get_interaction(&self, id: &str) -> Result<Option<Interaction>> {
        let row = sqlx::query("SELECT id, query, created_at FROM interactions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let turns = sqlx::query(
            "SELECT id, interaction_id, role, text, created_at FROM conversations \
             WHERE interaction_id = ? ORDER BY seq ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(Interaction {
            id: row.get("id"),
            query: row.get("query"),
            created_at: from_millis(row.get("created_at")),
            conversations: turns
                .iter()
                .map(conversation_from_row)
                .collect::<Result<_>>()?,
        }))
    }
}

#[async_trait]
impl SearchIndex for SqliteStorage {
    async fn search(&self, config: &SearchConfig) -> Result<SearchResults> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM documents WHERE 1 = 1", DOCUMENT_COLUMNS));
        if let Some(ref ds) = config.filters.datasource_id {
            qb.push(" AND datasource_id = ").push_bind(ds);
        }
        if let Some(ref st) = config.filters.source_type {
            qb.push(" AND source_type = ").push_bind(st);
        }
        if config.embedding.is_some() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM content_parts p WHERE p.document_id = documents.id)",
            );
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let docs = self.documents_with_parts(rows).await?;
        Ok(ragbridge_core::search::rank(&docs, config))
    }
}
