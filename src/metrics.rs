//! Per-datasource collection metrics.
//!
//! [`Metrics`] keeps counters and last-run durations in process memory,
//! keyed by `(metric, datasource_id)`, and mirrors every update as a
//! `tracing` event under the `metrics` target. It is shared behind an `Arc`
//! by concurrently running collectors; all updates take a short mutex.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Successfully stored documents.
pub const DOCUMENTS_COLLECTED: &str = "documents_collected";
/// Any collection failure: state load, retries exhausted, cursor update,
/// or a single document store.
pub const COLLECTION_ERRORS: &str = "collection_errors";
/// Wall-clock time of a successful run.
pub const COLLECTION_DURATION: &str = "collection_duration";

type Key = (&'static str, String);

#[derive(Debug, Default)]
pub struct Metrics {
    counters: Mutex<HashMap<Key, u64>>,
    durations: Mutex<HashMap<Key, Duration>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &'static str, datasource_id: &str) {
        self.add(name, datasource_id, 1);
    }

    pub fn add(&self, name: &'static str, datasource_id: &str, value: u64) {
        if value == 0 {
            return;
        }
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let total = counters
            .entry((name, datasource_id.to_string()))
            .or_insert(0);
        *total += value;
        tracing::debug!(target: "metrics", metric = name, datasource_id, value, total = *total);
    }

    pub fn record_duration(&self, name: &'static str, datasource_id: &str, elapsed: Duration) {
        self.durations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((name, datasource_id.to_string()), elapsed);
        tracing::debug!(
            target: "metrics",
            metric = name,
            datasource_id,
            elapsed_ms = elapsed.as_millis() as u64
        );
    }

    /// Current value of a counter (0 if never incremented).
    pub fn counter(&self, name: &str, datasource_id: &str) -> u64 {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|((n, ds), _)| *n == name && ds == datasource_id)
            .map(|(_, v)| *v)
            .unwrap_or(0)
    }

    /// Most recent duration recorded for a datasource.
    pub fn last_duration(&self, name: &str, datasource_id: &str) -> Option<Duration> {
        self.durations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|((n, ds), _)| *n == name && ds == datasource_id)
            .map(|(_, d)| *d)
    }
}
