use crate::config::SourceConfig;
use crate::source::{RecordSource, SourceError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

/// Maximum ids per work-item detail request accepted by the tracker.
pub const BATCH_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
struct WiqlResponse {
    #[serde(default, rename = "workItems")]
    work_items: Vec<WorkItemRef>,
}

#[derive(Debug, Deserialize)]
struct WorkItemRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct WorkItemBatch {
    #[serde(default)]
    value: Vec<Value>,
}

/// Azure DevOps work items carrying the configured tag.
///
/// One WIQL query resolves matching ids, then details are fetched in batches
/// of [`BATCH_SIZE`] with all fields expanded. A failed batch is logged and
/// left out rather than failing the whole load, unless every batch failed.
pub struct AdoSource {
    client: reqwest::Client,
    base_url: String,
    organization: String,
    project: String,
    api_version: String,
    pat: String,
    search_tag: String,
    work_item_types: Vec<String>,
}

impl AdoSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            organization: config.organization.clone(),
            project: config.project.clone(),
            api_version: config.api_version.clone(),
            pat: config.pat.clone(),
            search_tag: config.search_tag.clone(),
            work_item_types: config.work_item_types.clone(),
        })
    }

    /// `{base}/{org}/{project}/_apis/wit/{endpoint}` with organization and
    /// project percent-encoded as path segments.
    fn endpoint(&self, endpoint: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::Unavailable(format!("invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| SourceError::Unavailable("base_url cannot hold a path".to_string()))?
            .pop_if_empty()
            .push(&self.organization)
            .push(&self.project)
            .extend(["_apis", "wit", endpoint]);
        Ok(url)
    }

    fn wiql_query(&self) -> String {
        let types = self
            .work_item_types
            .iter()
            .map(|t| format!("'{}'", escape_wiql(t)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT [System.Id], [System.Title], [System.State], [System.WorkItemType], \
             [System.Tags], [System.CreatedDate], [System.ChangedDate], [System.AssignedTo], \
             [System.Priority], [Microsoft.VSTS.Common.Severity] \
             FROM WorkItems \
             WHERE [System.Tags] CONTAINS '{}' AND [System.WorkItemType] IN ({}) \
             ORDER BY [System.ChangedDate] DESC",
            escape_wiql(&self.search_tag),
            types
        )
    }

    async fn query_ids(&self) -> Result<Vec<u64>, SourceError> {
        let url = self.endpoint("wiql")?;
        let resp = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .basic_auth("", Some(&self.pat))
            .json(&json!({ "query": self.wiql_query() }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        let body: WiqlResponse = resp.json().await?;
        Ok(body.work_items.into_iter().map(|item| item.id).collect())
    }

    async fn fetch_batch(&self, ids: &[u64]) -> Result<Vec<Value>, SourceError> {
        let url = self.endpoint("workitems")?;
        let ids = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let resp = self
            .client
            .get(url)
            .query(&[
                ("ids", ids.as_str()),
                ("api-version", self.api_version.as_str()),
                ("$expand", "all"),
            ])
            .basic_auth("", Some(&self.pat))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }
        let batch: WorkItemBatch = resp.json().await?;
        Ok(batch.value)
    }
}

fn escape_wiql(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl RecordSource for AdoSource {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        if self.pat.is_empty() {
            return Err(SourceError::Unavailable(
                "no personal access token configured".to_string(),
            ));
        }
        if self.organization.is_empty() || self.project.is_empty() {
            return Err(SourceError::Unavailable(
                "organization and project must be set".to_string(),
            ));
        }

        let ids = self.query_ids().await?;
        tracing::info!(
            tag = %self.search_tag,
            matches = ids.len(),
            "work item query completed"
        );

        let mut records = Vec::with_capacity(ids.len());
        let mut loaded_batches = 0usize;
        for (index, chunk) in ids.chunks(BATCH_SIZE).enumerate() {
            match self.fetch_batch(chunk).await {
                Ok(items) => {
                    loaded_batches += 1;
                    records.extend(items);
                }
                Err(e) => {
                    tracing::warn!(
                        batch = index,
                        ids = chunk.len(),
                        error = %e,
                        "work item batch failed, skipping"
                    );
                }
            }
        }

        // Matches with no readable details are a failed load, not an empty one.
        if !ids.is_empty() && loaded_batches == 0 {
            return Err(SourceError::Unavailable(format!(
                "all {} work item batches failed",
                ids.len().div_ceil(BATCH_SIZE)
            )));
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(base_url: &str) -> AdoSource {
        let config = SourceConfig {
            base_url: base_url.to_string(),
            organization: "contoso".to_string(),
            project: "Shop Web".to_string(),
            ..SourceConfig::default()
        };
        AdoSource::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = source("https://dev.azure.com").endpoint("wiql").unwrap();
        assert_eq!(
            url.as_str(),
            "https://dev.azure.com/contoso/Shop%20Web/_apis/wit/wiql"
        );

        let url = source("https://tfs.local/collection/").endpoint("workitems").unwrap();
        assert_eq!(
            url.as_str(),
            "https://tfs.local/collection/contoso/Shop%20Web/_apis/wit/workitems"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            source("not a url").endpoint("wiql"),
            Err(SourceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_wiql_query_uses_tag_and_types() {
        let mut src = source("https://dev.azure.com");
        src.search_tag = "o'hack".to_string();
        src.work_item_types = vec!["Bug".to_string(), "User Story".to_string()];
        let query = src.wiql_query();
        assert!(query.contains("CONTAINS 'o''hack'"));
        assert!(query.contains("IN ('Bug', 'User Story')"));
        assert!(query.ends_with("ORDER BY [System.ChangedDate] DESC"));
    }

    #[tokio::test]
    async fn test_missing_pat_is_unavailable() {
        let err = source("https://dev.azure.com").fetch().await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(msg) if msg.contains("token")));
    }
}
