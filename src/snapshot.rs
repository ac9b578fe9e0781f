use crate::record::{normalize_all, NormalizedRecord};
use crate::source::{LoadedRecords, SourceChain, SourceError, NO_SOURCE};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use std::sync::{Arc, RwLock};

/// One complete, normalized record set and where it came from.
#[derive(Debug)]
pub struct Snapshot {
    pub records: Vec<NormalizedRecord>,
    pub source: String,
    /// Record count per origin within the source (one entry per export file
    /// for JSONL).
    pub origins: IndexMap<String, usize>,
    pub loaded_at: DateTime<Utc>,
    /// Increments on every swap; 0 is the empty startup snapshot.
    pub generation: u64,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            source: NO_SOURCE.to_string(),
            origins: IndexMap::new(),
            loaded_at: Utc::now(),
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Holds the current snapshot. Readers clone the `Arc` and keep a consistent
/// view for as long as they need it; a refresh builds the replacement fully
/// before swapping it in.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::empty())),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Normalize `loaded` and swap it in as the next generation.
    pub fn replace(&self, loaded: LoadedRecords) -> Arc<Snapshot> {
        let records = normalize_all(loaded.records);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let next = Arc::new(Snapshot {
            records,
            source: loaded.source,
            origins: loaded.origins,
            loaded_at: Utc::now(),
            generation: guard.generation + 1,
        });
        *guard = next.clone();
        drop(guard);

        tracing::info!(
            generation = next.generation,
            records = next.len(),
            source = %next.source,
            "snapshot replaced"
        );
        next
    }

    /// Reload through `chain`. Concurrent refreshes are serialized so each one
    /// observes the previous result.
    ///
    /// When every source fails, an empty set only replaces an empty snapshot;
    /// loaded data is kept and the failure reported instead.
    pub async fn refresh(&self, chain: &SourceChain) -> Result<Arc<Snapshot>, SourceError> {
        let _guard = self.refresh_lock.lock().await;
        let loaded = chain.load().await;
        if loaded.source == NO_SOURCE && !self.current().is_empty() {
            return Err(SourceError::Unavailable(
                "every record source failed, keeping current snapshot".to_string(),
            ));
        }
        Ok(self.replace(loaded))
    }
}

/// Periodically refresh `store` through `chain`. The first tick is skipped
/// since startup already loaded once.
pub async fn refresh_loop(store: Arc<SnapshotStore>, chain: Arc<SourceChain>, interval_secs: u64) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    interval.tick().await;

    loop {
        interval.tick().await;
        tracing::info!("scheduled snapshot refresh");
        if let Err(e) = store.refresh(&chain).await {
            tracing::warn!(error = %e, "scheduled refresh failed");
        }
    }
}
