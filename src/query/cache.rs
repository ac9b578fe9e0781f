use moka::sync::Cache;
use std::time::Duration;

/// Serialized endpoint responses keyed on
/// `"{endpoint}:{generation}:{params}"`, with a configurable TTL.
///
/// The snapshot generation is part of every key, so entries computed before a
/// refresh are never returned for the new data.
pub struct ReportCache {
    inner: Cache<String, String>,
}

impl ReportCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            inner: Cache::builder()
                .time_to_live(Duration::from_secs(ttl_secs))
                .max_capacity(256)
                .build(),
        }
    }

    pub fn cache_key(endpoint: &str, generation: u64, params: &str) -> String {
        format!("{endpoint}:{generation}:{params}")
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, value: String) {
        self.inner.insert(key, value);
    }

    /// Drop everything, used after a refresh.
    pub fn clear(&self) {
        self.inner.invalidate_all();
    }
}
