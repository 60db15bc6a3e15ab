//! Local directory datasource.
//!
//! Walks `root`, keeps files matching the include globs and none of the
//! exclude globs, and returns those modified at or after the persisted
//! cursor. The cursor is the newest mtime seen so far, in unix seconds:
//!
//! ```json
//! {"cursor": 1718000000}
//! ```
//!
//! Files from the cursor's own second are returned again on the next run,
//! since a later write in that second has the same whole-second mtime.
//! Document ids are stable, so the repeat overwrites the stored copy.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use super::{Batch, Datasource};
use ragbridge_core::models::{DatasourceState, Document};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemSettings {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

pub struct FilesystemDatasource {
    id: String,
    settings: FilesystemSettings,
}

impl FilesystemDatasource {
    pub fn new(id: &str, settings: FilesystemSettings) -> Self {
        Self {
            id: id.to_string(),
            settings,
        }
    }
}

#[async_trait]
impl Datasource for FilesystemDatasource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_data(&self, state: &DatasourceState) -> Result<Batch> {
        let cursor = read_cursor(state)?;
        let id = self.id.clone();
        let settings = self.settings.clone();

        let (documents, newest) =
            tokio::task::spawn_blocking(move || scan(&id, &settings, cursor)).await??;

        Ok(Batch {
            documents,
            state: DatasourceState(json!({ "cursor": newest.max(cursor) })),
        })
    }
}

fn read_cursor(state: &DatasourceState) -> Result<i64> {
    if state.is_empty() {
        return Ok(0);
    }
    state
        .0
        .get("cursor")
        .and_then(|c| c.as_i64())
        .with_context(|| format!("filesystem state has no integer cursor: {}", state.0))
}

fn scan(id: &str, settings: &FilesystemSettings, cursor: i64) -> Result<(Vec<Document>, i64)> {
    let root = &settings.root;
    if !root.exists() {
        bail!("filesystem root does not exist: {}", root.display());
    }

    let include_set = build_globset(&settings.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    excludes.extend(settings.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();
    let mut newest = cursor;

    for entry in WalkDir::new(root).follow_links(settings.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .to_string();
        if exclude_set.is_match(&rel) || !include_set.is_match(&rel) {
            continue;
        }

        let mtime = modified_secs(path)?;
        if mtime < cursor {
            continue;
        }
        newest = newest.max(mtime);
        documents.push(file_to_document(id, path, &rel, mtime)?);
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok((documents, newest))
}

fn modified_secs(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH);
    Ok(modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64)
}

fn file_to_document(datasource_id: &str, path: &Path, rel: &str, mtime: i64) -> Result<Document> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let body = String::from_utf8_lossy(&bytes).into_owned();

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| rel.to_string());

    let mut doc = Document::new(document_id(datasource_id, rel), body).with_title(title);
    doc.metadata = json!({
        "path": rel,
        "url": format!("file://{}", path.display()),
        "modified": mtime,
    });
    Ok(doc)
}

/// Stable across runs so re-collecting a changed file replaces it.
pub fn document_id(datasource_id: &str, relative_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(datasource_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(relative_path.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
