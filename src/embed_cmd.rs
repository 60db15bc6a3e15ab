//! Embedding backfill: `ragbridge embed pending`.
//!
//! Collection stores documents without content parts. This pass runs the
//! active embedding provider over those documents. A failed document is
//! reported and skipped; the rest of the batch continues.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::db;
use crate::provider::{EmbeddingProvider, ProviderFactory};
use crate::sqlite_store::SqliteStorage;
use ragbridge_core::store::DatasourceStore;

#[derive(Debug, Default)]
pub struct EmbedReport {
    pub pending: usize,
    pub embedded: usize,
    pub failures: Vec<(String, String)>,
}

/// Embed up to `limit` documents that have no content parts yet.
pub async fn embed_pending<S: DatasourceStore + ?Sized>(
    store: &S,
    provider: &dyn EmbeddingProvider,
    limit: usize,
) -> Result<EmbedReport> {
    let pending = store.pending_embeddings(limit).await?;
    let mut report = EmbedReport {
        pending: pending.len(),
        ..EmbedReport::default()
    };

    for mut document in pending {
        if let Err(e) = provider.process(&mut document).await {
            tracing::warn!(document_id = %document.id, error = %e, "embedding failed");
            report.failures.push((document.id, e.to_string()));
            continue;
        }
        if let Err(e) = store.update_embedding(&document.id, &document.embedding).await {
            tracing::warn!(
                document_id = %document.id,
                error = %format!("{:#}", e),
                "failed to store embedding"
            );
            report.failures.push((document.id, format!("{:#}", e)));
            continue;
        }
        report.embedded += 1;
    }

    Ok(report)
}

pub async fn run_embed_pending(config: &Config, limit: Option<usize>) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = Arc::new(SqliteStorage::new(pool));
    let providers = ProviderFactory::new(store.clone(), config.providers.timeout());

    let provider = match providers.embedding().await? {
        Some(p) => p,
        None => bail!(
            "No active embedding provider. Run `ragbridge provider activate embedding <id>`."
        ),
    };

    let report =
        embed_pending(store.as_ref(), provider.as_ref(), limit.unwrap_or(usize::MAX)).await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all documents up to date");
        return Ok(());
    }
    println!("  provider: {}", provider.id());
    println!("  total pending: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failures.len());
    for (id, error) in &report.failures {
        println!("    {}: {}", id, error);
    }
    Ok(())
}
