//! Idempotent schema setup. Safe to run on every start.

use anyhow::Result;
use sqlx::SqlitePool;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS datasources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source_type TEXT NOT NULL,
        settings_json TEXT NOT NULL DEFAULT '{}',
        state_json TEXT NOT NULL DEFAULT 'null',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        title TEXT,
        body TEXT NOT NULL,
        datasource_id TEXT,
        datasource_name TEXT,
        source_type TEXT,
        fetched_at INTEGER,
        metadata_json TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS content_parts (
        document_id TEXT NOT NULL,
        part_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB NOT NULL,
        provider_id TEXT NOT NULL,
        token_count INTEGER NOT NULL,
        generated_at INTEGER NOT NULL,
        PRIMARY KEY (document_id, part_index),
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS providers (
        id TEXT PRIMARY KEY,
        category TEXT NOT NULL,
        name TEXT NOT NULL,
        provider_type TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'inactive',
        settings_json TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS interactions (
        id TEXT PRIMARY KEY,
        query TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS conversations (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        interaction_id TEXT NOT NULL,
        role TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (interaction_id) REFERENCES interactions(id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_datasource ON documents(datasource_id)",
    "CREATE INDEX IF NOT EXISTS idx_providers_category_status ON providers(category, status)",
    "CREATE INDEX IF NOT EXISTS idx_conversations_interaction ON conversations(interaction_id, seq)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_created_at ON interactions(created_at DESC)",
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!(statements = SCHEMA.len(), "schema up to date");
    Ok(())
}
