//! Pull-based datasources keyed by an opaque cursor.
//!
//! A [`Datasource`] turns the cursor persisted by the previous run into a
//! [`Batch`] of new documents plus the next cursor. The collector owns
//! persistence; datasources never touch storage.
//!
//! Concrete datasources are a closed set ([`DatasourceKind`]). Records are
//! turned into live instances by [`build_datasource`], which rejects an
//! unknown `source_type` or settings that do not fit the declared type.

pub mod filesystem;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use ragbridge_core::models::{DatasourceRecord, DatasourceState, Document};

pub use filesystem::{FilesystemDatasource, FilesystemSettings};

/// Documents fetched in one `get_data` call and the cursor to persist
/// once they have been accepted.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub documents: Vec<Document>,
    pub state: DatasourceState,
}

#[async_trait]
pub trait Datasource: Send + Sync {
    /// Id of the datasource record this instance was built from.
    fn id(&self) -> &str;

    /// Fetch everything newer than `state`.
    ///
    /// Errors are treated as transient by the collector and retried.
    async fn get_data(&self, state: &DatasourceState) -> Result<Batch>;
}

#[derive(Debug, thiserror::Error)]
pub enum DatasourceError {
    #[error("unsupported datasource type '{0}'")]
    UnsupportedType(String),
    #[error("invalid settings for {source_type} datasource '{id}': {error}")]
    InvalidSettings {
        id: String,
        source_type: &'static str,
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasourceKind {
    Filesystem,
}

impl DatasourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasourceKind::Filesystem => "filesystem",
        }
    }
}

impl fmt::Display for DatasourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasourceKind {
    type Err = DatasourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filesystem" => Ok(DatasourceKind::Filesystem),
            other => Err(DatasourceError::UnsupportedType(other.to_string())),
        }
    }
}

pub fn build_datasource(record: &DatasourceRecord) -> Result<Box<dyn Datasource>, DatasourceError> {
    let kind: DatasourceKind = record.source_type.parse()?;
    match kind {
        DatasourceKind::Filesystem => {
            let settings: FilesystemSettings = serde_json::from_value(record.settings.clone())
                .map_err(|e| DatasourceError::InvalidSettings {
                    id: record.id.clone(),
                    source_type: kind.as_str(),
                    error: e.to_string(),
                })?;
            Ok(Box::new(FilesystemDatasource::new(&record.id, settings)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(source_type: &str, settings: serde_json::Value) -> DatasourceRecord {
        DatasourceRecord {
            id: "ds-1".to_string(),
            name: "docs".to_string(),
            source_type: source_type.to_string(),
            settings,
            state: DatasourceState::empty(),
        }
    }

    #[test]
    fn test_build_filesystem() {
        let ds = build_datasource(&record("filesystem", json!({"root": "/tmp"}))).unwrap();
        assert_eq!(ds.id(), "ds-1");
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = build_datasource(&record("confluence", json!({}))).err().unwrap();
        assert!(matches!(err, DatasourceError::UnsupportedType(ref t) if t == "confluence"));
    }

    #[test]
    fn test_mismatched_settings_rejected() {
        let err = build_datasource(&record("filesystem", json!({"bucket": "x"})))
            .err()
            .unwrap();
        assert!(matches!(err, DatasourceError::InvalidSettings { .. }));
    }
}
