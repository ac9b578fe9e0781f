//! Record sources and the fallback chain that picks one.
//!
//! Each [`RecordSource`] yields raw JSON records. [`SourceChain`] tries them
//! in the configured order and keeps the first success; a chain where every
//! source fails still produces an (empty) record set so the service can start.

pub mod ado;
pub mod cache;
pub mod jsonl;

use crate::config::SourceConfig;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

pub use ado::AdoSource;
pub use cache::{CacheSource, SnapshotWriter};
pub use jsonl::JsonlSource;

/// Label of the record set produced when no source succeeded.
pub const NO_SOURCE: &str = "none";

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response status: {0}")]
    Status(u16),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Records from one origin within a source, such as one file of a
/// multi-file export.
#[derive(Debug, Clone)]
pub struct SourcePart {
    pub origin: String,
    pub records: Vec<Value>,
}

/// A place raw records can be loaded from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Vec<Value>, SourceError>;

    /// Records grouped by origin, in load order. Single-origin sources report
    /// everything under their own name.
    async fn fetch_parts(&self) -> Result<Vec<SourcePart>, SourceError> {
        Ok(vec![SourcePart {
            origin: self.name().to_string(),
            records: self.fetch().await?,
        }])
    }

    /// Remote results are mirrored to the on-disk cache after a successful load.
    fn is_remote(&self) -> bool {
        false
    }
}

/// Records from the first source that answered.
#[derive(Debug, Clone)]
pub struct LoadedRecords {
    pub source: String,
    pub records: Vec<Value>,
    /// Record count per origin, in load order.
    pub origins: IndexMap<String, usize>,
}

impl LoadedRecords {
    /// A set with a single origin named after its source.
    pub fn single(source: impl Into<String>, records: Vec<Value>) -> Self {
        let source = source.into();
        let mut origins = IndexMap::new();
        origins.insert(source.clone(), records.len());
        Self {
            source,
            records,
            origins,
        }
    }

    fn from_parts(source: &str, parts: Vec<SourcePart>) -> Self {
        let mut origins = IndexMap::new();
        let mut records = Vec::new();
        for part in parts {
            *origins.entry(part.origin).or_insert(0) += part.records.len();
            records.extend(part.records);
        }
        Self {
            source: source.to_string(),
            records,
            origins,
        }
    }
}

pub struct SourceChain {
    sources: Vec<Box<dyn RecordSource>>,
    writer: Option<SnapshotWriter>,
}

impl SourceChain {
    pub fn new(sources: Vec<Box<dyn RecordSource>>) -> Self {
        Self {
            sources,
            writer: None,
        }
    }

    pub fn with_writer(mut self, writer: SnapshotWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Try each source in order. Failures are logged and skipped.
    pub async fn load(&self) -> LoadedRecords {
        for source in &self.sources {
            match source.fetch_parts().await {
                Ok(parts) => {
                    let loaded = LoadedRecords::from_parts(source.name(), parts);
                    tracing::info!(
                        source = source.name(),
                        records = loaded.records.len(),
                        origins = loaded.origins.len(),
                        "records loaded"
                    );
                    if source.is_remote() {
                        if let Some(writer) = &self.writer {
                            if let Err(e) = writer.write(&loaded.records).await {
                                tracing::warn!(error = %e, "failed to write snapshot cache");
                            }
                        }
                    }
                    return loaded;
                }
                Err(e) => {
                    tracing::warn!(
                        source = source.name(),
                        error = %e,
                        "record source failed, trying next"
                    );
                }
            }
        }

        tracing::warn!(
            sources = ?self.names(),
            "no record source available, continuing with an empty record set"
        );
        LoadedRecords {
            source: NO_SOURCE.to_string(),
            records: Vec::new(),
            origins: IndexMap::new(),
        }
    }
}

/// Build the chain named by `config.order`. Names are checked by
/// `AppConfig::validate`; an unknown one here is still reported.
pub fn build_chain(config: &SourceConfig) -> Result<SourceChain, SourceError> {
    let mut sources: Vec<Box<dyn RecordSource>> = Vec::with_capacity(config.order.len());
    for name in &config.order {
        match name.as_str() {
            "remote" => sources.push(Box::new(AdoSource::new(config)?)),
            "cache" => sources.push(Box::new(CacheSource::new(config.cache_path.clone()))),
            "jsonl" => sources.push(Box::new(JsonlSource::new(config.jsonl_paths.clone()))),
            other => {
                return Err(SourceError::Unavailable(format!("unknown source '{other}'")));
            }
        }
    }

    let chain = SourceChain::new(sources);
    if config.order.iter().any(|name| name == "remote") {
        Ok(chain.with_writer(SnapshotWriter::new(config)))
    } else {
        Ok(chain)
    }
}
