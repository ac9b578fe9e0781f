use crate::config::SourceConfig;
use crate::source::{RecordSource, SourceError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A previously saved snapshot on local disk.
///
/// Accepts a bare array of records or an object holding them under
/// `records` (as written by [`SnapshotWriter`]) or `defects`.
pub struct CacheSource {
    path: PathBuf,
}

impl CacheSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Pull the record array out of a cached document.
pub fn records_from_document(doc: Value) -> Option<Vec<Value>> {
    match doc {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => ["records", "defects"].iter().find_map(|key| {
            match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            }
        }),
        _ => None,
    }
}

#[async_trait]
impl RecordSource for CacheSource {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(SourceError::Unavailable(format!(
                    "{} does not exist",
                    self.path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let doc: Value = serde_json::from_slice(&bytes)?;
        records_from_document(doc).ok_or_else(|| {
            SourceError::Unavailable(format!("{} holds no record array", self.path.display()))
        })
    }
}

/// Mirrors remote loads to the cache file so later starts can work offline.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    path: PathBuf,
    organization: String,
    project: String,
    search_tag: String,
}

impl SnapshotWriter {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            path: config.cache_path.clone(),
            organization: config.organization.clone(),
            project: config.project.clone(),
            search_tag: config.search_tag.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `{metadata, records}` through a temporary file and rename, so a
    /// reader never sees a half-written document.
    pub async fn write(&self, records: &[Value]) -> Result<(), SourceError> {
        let doc = json!({
            "metadata": {
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "organization": self.organization,
                "project": self.project,
                "search_tag": self.search_tag,
                "total_analyzed": records.len(),
            },
            "records": records,
        });
        let body = serde_json::to_vec_pretty(&doc)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "snapshot cache written"
        );
        Ok(())
    }
}
