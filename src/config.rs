use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Reload records in the background every this many seconds; 0 disables.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// Directory `POST /api/export` writes its files into.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_ttl_secs: default_cache_ttl(),
            refresh_interval_secs: 0,
            export_dir: default_export_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_cache_ttl() -> u64 {
    60
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// Where records come from, and in which order sources are tried.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Source names tried in order: `remote`, `cache`, `jsonl`.
    #[serde(default = "default_order")]
    pub order: Vec<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub project: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Personal access token for the tracker. The remote source is skipped
    /// when this is empty.
    #[serde(default)]
    pub pat: String,
    #[serde(default = "default_search_tag")]
    pub search_tag: String,
    #[serde(default = "default_work_item_types")]
    pub work_item_types: Vec<String>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_jsonl_paths")]
    pub jsonl_paths: Vec<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            order: default_order(),
            base_url: default_base_url(),
            organization: String::new(),
            project: String::new(),
            api_version: default_api_version(),
            pat: String::new(),
            search_tag: default_search_tag(),
            work_item_types: default_work_item_types(),
            timeout_secs: default_timeout(),
            cache_path: default_cache_path(),
            jsonl_paths: default_jsonl_paths(),
        }
    }
}

pub const KNOWN_SOURCES: &[&str] = &["remote", "cache", "jsonl"];

fn default_order() -> Vec<String> {
    KNOWN_SOURCES.iter().map(|s| s.to_string()).collect()
}
fn default_base_url() -> String {
    "https://dev.azure.com".to_string()
}
fn default_api_version() -> String {
    "7.0".to_string()
}
fn default_search_tag() -> String {
    "hack".to_string()
}
fn default_work_item_types() -> Vec<String> {
    ["Bug", "Task", "User Story", "Feature", "Epic"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_timeout() -> u64 {
    30
}
fn default_cache_path() -> PathBuf {
    PathBuf::from("data/defects_data.json")
}
fn default_jsonl_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("data/TrainingData.jsonl"),
        PathBuf::from("data/TestData.jsonl"),
    ]
}

/// Classification policy for the analytics engine.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default = "default_recent_window")]
    pub recent_window_days: i64,
    #[serde(default = "default_bug_type")]
    pub bug_type: String,
    #[serde(default = "default_critical_priorities")]
    pub critical_priorities: Vec<String>,
    #[serde(default = "default_resolved_states")]
    pub resolved_states: Vec<String>,
    #[serde(default = "default_open_states")]
    pub open_states: Vec<String>,
    #[serde(default = "default_high_score")]
    pub high_score_threshold: f64,
    /// Base of work-item links in highlight lists,
    /// e.g. `https://dev.azure.com/{org}/{project}`.
    #[serde(default)]
    pub item_url_base: Option<String>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_window_days: default_recent_window(),
            bug_type: default_bug_type(),
            critical_priorities: default_critical_priorities(),
            resolved_states: default_resolved_states(),
            open_states: default_open_states(),
            high_score_threshold: default_high_score(),
            item_url_base: None,
        }
    }
}

fn default_recent_window() -> i64 {
    30
}
fn default_bug_type() -> String {
    "Bug".to_string()
}
fn default_critical_priorities() -> Vec<String> {
    vec!["1".to_string(), "High".to_string(), "2".to_string()]
}
fn default_resolved_states() -> Vec<String> {
    ["resolved", "closed", "done"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_open_states() -> Vec<String> {
    ["new", "active", "committed", "approved"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_high_score() -> f64 {
    0.8
}

impl AppConfig {
    /// Validate cross-field constraints the deserializer cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.source.order.is_empty() {
            return Err("source.order must name at least one source".to_string());
        }
        if let Some(unknown) = self
            .source
            .order
            .iter()
            .find(|name| !KNOWN_SOURCES.contains(&name.as_str()))
        {
            return Err(format!(
                "unknown source '{unknown}' in source.order. Valid values: {}",
                KNOWN_SOURCES.join(", ")
            ));
        }
        if self.analytics.recent_window_days <= 0 {
            return Err("analytics.recent_window_days must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.analytics.high_score_threshold) {
            return Err("analytics.high_score_threshold must be within [0, 1]".to_string());
        }
        Ok(())
    }

    /// Link base for work items, derived from the source settings unless
    /// overridden in `analytics.item_url_base`.
    pub fn item_url_base(&self) -> Option<String> {
        if let Some(base) = &self.analytics.item_url_base {
            return Some(base.trim_end_matches('/').to_string());
        }
        if self.source.organization.is_empty() || self.source.project.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}/{}",
            self.source.base_url.trim_end_matches('/'),
            self.source.organization,
            self.source.project
        ))
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (DEFECTBOARD__SERVER__PORT=5001, etc.)
        builder = builder.add_source(
            Environment::with_prefix("DEFECTBOARD")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("source.order")
                .with_list_parse_key("source.jsonl_paths")
                .with_list_parse_key("source.work_item_types")
                .with_list_parse_key("analytics.critical_priorities")
                .with_list_parse_key("analytics.resolved_states")
                .with_list_parse_key("analytics.open_states")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
