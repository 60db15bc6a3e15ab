//! Datasource collection worker.
//!
//! One [`CollectorWorker::collect`] call is one collection run:
//!
//! 1. load the datasource record (settings, name, persisted cursor);
//! 2. call [`Datasource::get_data`] up to `attempts` times, waiting `delay`
//!    between failures;
//! 3. persist the new cursor together with the unchanged settings;
//! 4. stamp every returned document with its source and fetch time and
//!    store it, recording a per-document outcome.
//!
//! Only step 2 is retried. A failure in step 1 or 3 ends the run. A failed
//! document store is logged and counted but does not stop the batch.
//!
//! The cursor is written before the documents. A crash between steps 3 and
//! 4 advances the cursor past documents that were never stored; the next
//! run will not fetch them again. Runs for the same datasource must be
//! serialized by the caller.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CollectorConfig, Config};
use crate::datasource::{build_datasource, Batch, Datasource};
use crate::metrics::{Metrics, COLLECTION_DURATION, COLLECTION_ERRORS, DOCUMENTS_COLLECTED};
use ragbridge_core::models::{DatasourceState, SourceAttribution};
use ragbridge_core::store::DatasourceStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; always at least 1.
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl From<&CollectorConfig> for RetryPolicy {
    fn from(config: &CollectorConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }
}

/// Waits between retry attempts. Swapped out in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("datasource '{0}' not found")]
    DatasourceNotFound(String),
    #[error("failed to load state for datasource '{id}': {error:#}")]
    StateLoad { id: String, error: anyhow::Error },
    #[error("datasource '{id}' failed after {attempts} attempts: {last_error:#}")]
    RetriesExhausted {
        id: String,
        attempts: u32,
        last_error: anyhow::Error,
    },
    #[error("failed to persist cursor for datasource '{id}': {error:#}")]
    CursorUpdate { id: String, error: anyhow::Error },
    #[error("collection of datasource '{0}' was cancelled")]
    Cancelled(String),
}

#[derive(Debug)]
pub struct DocumentOutcome {
    pub document_id: String,
    pub result: Result<()>,
}

#[derive(Debug)]
pub struct CollectReport {
    pub datasource_id: String,
    /// `get_data` calls made, including the successful one.
    pub attempts: u32,
    pub state: DatasourceState,
    pub outcomes: Vec<DocumentOutcome>,
    pub elapsed: Duration,
}

impl CollectReport {
    pub fn stored(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.stored()
    }
}

/// Attempt counter and last error of the fetch loop.
struct RetryState {
    max_attempts: u32,
    attempt: u32,
    last_error: Option<anyhow::Error>,
}

enum Next {
    Retry,
    GiveUp,
}

impl RetryState {
    fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempt: 0,
            last_error: None,
        }
    }

    fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    fn record_failure(&mut self, error: anyhow::Error) -> Next {
        self.last_error = Some(error);
        if self.attempt >= self.max_attempts {
            Next::GiveUp
        } else {
            Next::Retry
        }
    }

    fn into_error(self, id: &str) -> CollectError {
        CollectError::RetriesExhausted {
            id: id.to_string(),
            attempts: self.attempt,
            last_error: self
                .last_error
                .unwrap_or_else(|| anyhow::anyhow!("no attempt was made")),
        }
    }
}

pub struct CollectorWorker<S: DatasourceStore + ?Sized> {
    store: Arc<S>,
    metrics: Arc<Metrics>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: DatasourceStore + ?Sized> CollectorWorker<S> {
    pub fn new(store: Arc<S>, metrics: Arc<Metrics>, policy: RetryPolicy) -> Self {
        Self {
            store,
            metrics,
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub async fn collect(
        &self,
        datasource: &dyn Datasource,
        cancel: &CancellationToken,
    ) -> Result<CollectReport, CollectError> {
        let id = datasource.id().to_string();
        let result = self.run(datasource, cancel).await;
        match result {
            Ok(ref report) => {
                self.metrics
                    .record_duration(COLLECTION_DURATION, &id, report.elapsed);
                info!(
                    datasource_id = %id,
                    attempts = report.attempts,
                    stored = report.stored(),
                    failed = report.failed(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "collection completed"
                );
            }
            Err(CollectError::Cancelled(_)) => {
                info!(datasource_id = %id, "collection cancelled");
            }
            Err(ref e) => {
                self.metrics.increment(COLLECTION_ERRORS, &id);
                warn!(datasource_id = %id, error = %e, "collection failed");
            }
        }
        result
    }

    async fn run(
        &self,
        datasource: &dyn Datasource,
        cancel: &CancellationToken,
    ) -> Result<CollectReport, CollectError> {
        let started = Instant::now();
        let id = datasource.id();

        let record = self
            .store
            .get_datasource(id)
            .await
            .map_err(|error| CollectError::StateLoad {
                id: id.to_string(),
                error,
            })?
            .ok_or_else(|| CollectError::DatasourceNotFound(id.to_string()))?;

        let (batch, attempts) = self.fetch_with_retry(datasource, &record.state, cancel).await?;
        let Batch { documents, state } = batch;

        self.store
            .update_datasource(id, &record.settings, &state)
            .await
            .map_err(|error| CollectError::CursorUpdate {
                id: id.to_string(),
                error,
            })?;

        let source = SourceAttribution {
            datasource_id: record.id.clone(),
            name: record.name.clone(),
            source_type: record.source_type.clone(),
        };

        let mut outcomes = Vec::with_capacity(documents.len());
        for mut document in documents {
            document.source = Some(source.clone());
            document.fetched_at = Some(Utc::now());

            let result = self.store.store(&document).await;
            match result {
                Ok(()) => {
                    self.metrics.increment(DOCUMENTS_COLLECTED, id);
                    debug!(datasource_id = %id, document_id = %document.id, "document stored");
                }
                Err(ref e) => {
                    self.metrics.increment(COLLECTION_ERRORS, id);
                    warn!(
                        datasource_id = %id,
                        document_id = %document.id,
                        error = %format!("{:#}", e),
                        "failed to store document"
                    );
                }
            }
            outcomes.push(DocumentOutcome {
                document_id: document.id,
                result,
            });
        }

        Ok(CollectReport {
            datasource_id: id.to_string(),
            attempts,
            state,
            outcomes,
            elapsed: started.elapsed(),
        })
    }

    async fn fetch_with_retry(
        &self,
        datasource: &dyn Datasource,
        state: &DatasourceState,
        cancel: &CancellationToken,
    ) -> Result<(Batch, u32), CollectError> {
        let id = datasource.id();
        let cancelled = || CollectError::Cancelled(id.to_string());
        let mut retry = RetryState::new(self.policy.attempts);

        loop {
            let attempt = retry.begin_attempt();
            let result = tokio::select! {
                r = datasource.get_data(state) => r,
                _ = cancel.cancelled() => return Err(cancelled()),
            };

            let error = match result {
                Ok(batch) => return Ok((batch, attempt)),
                Err(e) => e,
            };
            warn!(
                datasource_id = %id,
                attempt,
                max_attempts = self.policy.attempts,
                error = %format!("{:#}", error),
                "get_data failed"
            );

            match retry.record_failure(error) {
                Next::GiveUp => return Err(retry.into_error(id)),
                Next::Retry => {
                    tokio::select! {
                        _ = self.sleeper.sleep(self.policy.delay) => {}
                        _ = cancel.cancelled() => return Err(cancelled()),
                    }
                }
            }
        }
    }
}

/// `ragbridge collect <id>`: build the datasource from its record and run
/// one collection, cancelled on Ctrl-C.
pub async fn run_collect(config: &Config, datasource_id: &str) -> anyhow::Result<()> {
    let pool = crate::db::connect(config).await?;
    let store = Arc::new(crate::sqlite_store::SqliteStorage::new(pool));

    let record = store
        .get_datasource(datasource_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("datasource '{}' not found", datasource_id))?;
    let datasource = build_datasource(&record)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let worker = CollectorWorker::new(store, Arc::new(Metrics::new()), (&config.collector).into());
    let report = worker.collect(datasource.as_ref(), &cancel).await?;

    println!("collect {}", record.id);
    println!("  attempts: {}", report.attempts);
    println!("  documents stored: {}", report.stored());
    println!("  documents failed: {}", report.failed());
    for outcome in report.outcomes.iter().filter(|o| o.result.is_err()) {
        if let Err(ref e) = outcome.result {
            println!("    {}: {:#}", outcome.document_id, e);
        }
    }
    println!("  cursor: {}", report.state.0);
    println!("  elapsed: {:.2}s", report.elapsed.as_secs_f64());
    Ok(())
}
