//! Collector worker behaviour against a scripted datasource and a store
//! that records every call.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ragbridge::collector::{CollectError, CollectorWorker, RetryPolicy, Sleeper};
use ragbridge::datasource::{Batch, Datasource};
use ragbridge::metrics::{Metrics, COLLECTION_DURATION, COLLECTION_ERRORS, DOCUMENTS_COLLECTED};
use ragbridge_core::models::{DatasourceRecord, DatasourceState, Document, Embedding};
use ragbridge_core::store::DatasourceStore;

// ─── Fakes ──────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingStore {
    record: Mutex<Option<DatasourceRecord>>,
    fail_state_load: bool,
    fail_update: bool,
    fail_documents: HashSet<String>,
    updates: Mutex<Vec<DatasourceState>>,
    stored: Mutex<Vec<Document>>,
    store_calls: AtomicU32,
}

impl RecordingStore {
    fn with_datasource(id: &str) -> Self {
        Self {
            record: Mutex::new(Some(DatasourceRecord {
                id: id.to_string(),
                name: "Team docs".to_string(),
                source_type: "scripted".to_string(),
                settings: json!({"root": "/srv/docs"}),
                state: DatasourceState(json!({"cursor": 7})),
            })),
            ..Self::default()
        }
    }

    fn updates(&self) -> Vec<DatasourceState> {
        self.updates.lock().unwrap().clone()
    }

    fn stored(&self) -> Vec<Document> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl DatasourceStore for RecordingStore {
    async fn create_datasource(&self, _record: &DatasourceRecord) -> Result<()> {
        unimplemented!()
    }

    async fn list_datasources(&self) -> Result<Vec<DatasourceRecord>> {
        unimplemented!()
    }

    async fn get_datasource(&self, _id: &str) -> Result<Option<DatasourceRecord>> {
        if self.fail_state_load {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.record.lock().unwrap().clone())
    }

    async fn update_datasource(
        &self,
        _id: &str,
        settings: &serde_json::Value,
        state: &DatasourceState,
    ) -> Result<()> {
        if self.fail_update {
            return Err(anyhow!("disk full"));
        }
        assert_eq!(settings, &json!({"root": "/srv/docs"}), "settings must be preserved");
        self.updates.lock().unwrap().push(state.clone());
        Ok(())
    }

    async fn store(&self, document: &Document) -> Result<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_documents.contains(&document.id) {
            return Err(anyhow!("constraint violation"));
        }
        self.stored.lock().unwrap().push(document.clone());
        Ok(())
    }

    async fn pending_embeddings(&self, _limit: usize) -> Result<Vec<Document>> {
        unimplemented!()
    }

    async fn update_embedding(&self, _document_id: &str, _embedding: &Embedding) -> Result<()> {
        unimplemented!()
    }
}

/// Fails the first `failures` calls, then returns `docs` documents.
struct ScriptedDatasource {
    failures: u32,
    docs: usize,
    calls: AtomicU32,
}

impl ScriptedDatasource {
    fn new(failures: u32, docs: usize) -> Self {
        Self {
            failures,
            docs,
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datasource for ScriptedDatasource {
    fn id(&self) -> &str {
        "ds-1"
    }

    async fn get_data(&self, state: &DatasourceState) -> Result<Batch> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        assert_eq!(state, &DatasourceState(json!({"cursor": 7})));
        if call <= self.failures {
            return Err(anyhow!("upstream timeout on call {}", call));
        }
        Ok(Batch {
            documents: (0..self.docs)
                .map(|i| Document::new(format!("doc-{}", i), format!("body {}", i)))
                .collect(),
            state: DatasourceState(json!({"cursor": 42})),
        })
    }
}

#[derive(Default)]
struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, delay: Duration) {
        self.waits.lock().unwrap().push(delay);
    }
}

fn worker(
    store: Arc<RecordingStore>,
    attempts: u32,
    sleeper: Arc<RecordingSleeper>,
) -> CollectorWorker<RecordingStore> {
    CollectorWorker::new(
        store,
        Arc::new(Metrics::new()),
        RetryPolicy::new(attempts, Duration::from_millis(250)),
    )
    .with_sleeper(sleeper)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_succeeds_on_last_attempt() {
    let store = Arc::new(RecordingStore::with_datasource("ds-1"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let worker = worker(store.clone(), 3, sleeper.clone());
    let ds = ScriptedDatasource::new(2, 2);

    let report = worker.collect(&ds, &CancellationToken::new()).await.unwrap();

    assert_eq!(ds.calls(), 3);
    assert_eq!(report.attempts, 3);
    assert_eq!(store.updates(), vec![DatasourceState(json!({"cursor": 42}))]);
    assert_eq!(report.stored(), 2);
    assert_eq!(
        *sleeper.waits.lock().unwrap(),
        vec![Duration::from_millis(250), Duration::from_millis(250)]
    );
    assert_eq!(worker.metrics().counter(DOCUMENTS_COLLECTED, "ds-1"), 2);
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 0);
    assert!(worker.metrics().last_duration(COLLECTION_DURATION, "ds-1").is_some());
}

#[tokio::test]
async fn test_all_attempts_fail() {
    let store = Arc::new(RecordingStore::with_datasource("ds-1"));
    let worker = worker(store.clone(), 3, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(u32::MAX, 2);

    let err = worker
        .collect(&ds, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        CollectError::RetriesExhausted {
            attempts,
            ref last_error,
            ..
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.to_string().contains("call 3"));
        }
        ref other => panic!("unexpected error: {}", other),
    }
    assert_eq!(ds.calls(), 3);
    assert!(store.updates().is_empty());
    assert_eq!(store.store_calls.load(Ordering::SeqCst), 0);
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 1);
    assert!(worker.metrics().last_duration(COLLECTION_DURATION, "ds-1").is_none());
}

#[tokio::test]
async fn test_single_attempt_does_not_wait() {
    let store = Arc::new(RecordingStore::with_datasource("ds-1"));
    let sleeper = Arc::new(RecordingSleeper::default());
    let worker = worker(store.clone(), 1, sleeper.clone());
    let ds = ScriptedDatasource::new(1, 1);

    assert!(worker.collect(&ds, &CancellationToken::new()).await.is_err());
    assert_eq!(ds.calls(), 1);
    assert!(sleeper.waits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_document_does_not_abort_batch() {
    let mut store = RecordingStore::with_datasource("ds-1");
    store.fail_documents.insert("doc-2".to_string());
    let store = Arc::new(store);
    let worker = worker(store.clone(), 1, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(0, 5);

    let report = worker.collect(&ds, &CancellationToken::new()).await.unwrap();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.stored(), 4);
    assert_eq!(report.failed(), 1);
    let failed: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| o.document_id.as_str())
        .collect();
    assert_eq!(failed, vec!["doc-2"]);

    assert_eq!(store.stored().len(), 4);
    assert_eq!(worker.metrics().counter(DOCUMENTS_COLLECTED, "ds-1"), 4);
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 1);
}

#[tokio::test]
async fn test_documents_are_attributed() {
    let store = Arc::new(RecordingStore::with_datasource("ds-1"));
    let worker = worker(store.clone(), 1, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(0, 1);

    worker.collect(&ds, &CancellationToken::new()).await.unwrap();

    let doc = &store.stored()[0];
    let source = doc.source.as_ref().unwrap();
    assert_eq!(source.datasource_id, "ds-1");
    assert_eq!(source.name, "Team docs");
    assert_eq!(source.source_type, "scripted");
    assert!(doc.fetched_at.is_some());
}

#[tokio::test]
async fn test_state_load_failure_is_not_retried() {
    let store = Arc::new(RecordingStore {
        fail_state_load: true,
        ..RecordingStore::with_datasource("ds-1")
    });
    let worker = worker(store.clone(), 3, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(0, 1);

    let err = worker
        .collect(&ds, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::StateLoad { .. }));
    assert_eq!(ds.calls(), 0);
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 1);
}

#[tokio::test]
async fn test_unknown_datasource() {
    let store = Arc::new(RecordingStore::default());
    let worker = worker(store, 3, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(0, 1);

    let err = worker
        .collect(&ds, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::DatasourceNotFound(ref id) if id == "ds-1"));
}

#[tokio::test]
async fn test_cursor_update_failure_stores_nothing() {
    let store = Arc::new(RecordingStore {
        fail_update: true,
        ..RecordingStore::with_datasource("ds-1")
    });
    let worker = worker(store.clone(), 3, Arc::new(RecordingSleeper::default()));
    let ds = ScriptedDatasource::new(0, 3);

    let err = worker
        .collect(&ds, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::CursorUpdate { .. }));
    assert_eq!(ds.calls(), 1);
    assert_eq!(store.store_calls.load(Ordering::SeqCst), 0);
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 1);
}

/// Sleeps for real so cancellation can interrupt the retry wait.
struct TokioWait;

#[async_trait]
impl Sleeper for TokioWait {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_wait() {
    let store = Arc::new(RecordingStore::with_datasource("ds-1"));
    let worker = CollectorWorker::new(
        store.clone(),
        Arc::new(Metrics::new()),
        RetryPolicy::new(5, Duration::from_secs(60)),
    )
    .with_sleeper(Arc::new(TokioWait));
    let ds = ScriptedDatasource::new(u32::MAX, 1);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), worker.collect(&ds, &cancel))
        .await
        .expect("cancellation should end the run promptly")
        .unwrap_err();
    assert!(matches!(err, CollectError::Cancelled(_)));
    assert_eq!(ds.calls(), 1);
    assert!(store.updates().is_empty());
    assert_eq!(worker.metrics().counter(COLLECTION_ERRORS, "ds-1"), 0);
}
