//! Datasource and provider management commands.
//!
//! `ragbridge datasource add|list` and `ragbridge provider
//! add|list|activate|deactivate`. Settings are passed as JSON and checked
//! against the declared type before anything is written.

use anyhow::{bail, Context, Result};
use chrono::Utc;

use crate::config::Config;
use crate::datasource::build_datasource;
use crate::db;
use crate::provider::factory;
use crate::sqlite_store::SqliteStorage;
use ragbridge_core::models::{
    DatasourceRecord, DatasourceState, Pagination, ProviderCategory, ProviderConfig,
    ProviderFilter, ProviderStatus,
};
use ragbridge_core::store::{DatasourceStore, ProviderStore};

async fn open(config: &Config) -> Result<SqliteStorage> {
    Ok(SqliteStorage::new(db::connect(config).await?))
}

fn parse_settings(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("settings must be valid JSON: {}", raw))
}

pub async fn run_datasource_add(
    config: &Config,
    name: &str,
    source_type: &str,
    settings: &str,
) -> Result<()> {
    let record = DatasourceRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        source_type: source_type.to_string(),
        settings: parse_settings(settings)?,
        state: DatasourceState::empty(),
    };
    build_datasource(&record)?;

    open(config).await?.create_datasource(&record).await?;
    println!("datasource added");
    println!("  id: {}", record.id);
    println!("  name: {}", record.name);
    println!("  type: {}", record.source_type);
    Ok(())
}

pub async fn run_datasource_list(config: &Config) -> Result<()> {
    let records = open(config).await?.list_datasources().await?;
    if records.is_empty() {
        println!("No datasources configured.");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<12} CURSOR", "ID", "NAME", "TYPE");
    for r in records {
        let cursor = if r.state.is_empty() {
            "-".to_string()
        } else {
            r.state.0.to_string()
        };
        println!("{:<38} {:<20} {:<12} {}", r.id, r.name, r.source_type, cursor);
    }
    Ok(())
}

pub async fn run_provider_add(
    config: &Config,
    category: ProviderCategory,
    name: &str,
    provider_type: &str,
    settings: &str,
    activate: bool,
) -> Result<()> {
    let now = Utc::now();
    let provider = ProviderConfig {
        id: uuid::Uuid::new_v4().to_string(),
        category,
        name: name.to_string(),
        provider_type: provider_type.to_string(),
        status: if activate {
            ProviderStatus::Active
        } else {
            ProviderStatus::Inactive
        },
        settings: parse_settings(settings)?,
        created_at: now,
        updated_at: now,
    };
    factory::validate(&provider, config.providers.timeout())?;

    open(config).await?.create_provider(&provider).await?;
    println!("{} provider added", category);
    println!("  id: {}", provider.id);
    println!("  type: {}", provider.provider_type);
    println!("  status: {}", provider.status.as_str());
    Ok(())
}

pub async fn run_provider_list(
    config: &Config,
    category: ProviderCategory,
    status: Option<ProviderStatus>,
) -> Result<()> {
    let page = open(config)
        .await?
        .list_providers(category, ProviderFilter { status }, Pagination::new(1, 1000))
        .await?;
    if page.items.is_empty() {
        println!("No {} providers.", category);
        return Ok(());
    }

    println!("{:<38} {:<20} {:<10} STATUS", "ID", "NAME", "TYPE");
    for p in page.items {
        println!(
            "{:<38} {:<20} {:<10} {}",
            p.id,
            p.name,
            p.provider_type,
            p.status.as_str()
        );
    }
    Ok(())
}

pub async fn run_provider_set_status(
    config: &Config,
    category: ProviderCategory,
    id: &str,
    active: bool,
) -> Result<()> {
    let store = open(config).await?;
    let found = if active {
        store.set_active(category, id).await?
    } else {
        store.set_inactive(category, id).await?
    };
    if !found {
        bail!("{} provider '{}' not found", category, id);
    }
    println!(
        "{} provider {} {}",
        category,
        id,
        if active { "activated" } else { "deactivated" }
    );
    Ok(())
}
