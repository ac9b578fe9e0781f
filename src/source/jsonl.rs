use crate::source::{RecordSource, SourceError, SourcePart};
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Test-failure exports, one JSON record per line, read from one or more
/// files and concatenated in order. Each file is its own origin, named by its
/// file stem (`TrainingData`, `TestData`).
pub struct JsonlSource {
    paths: Vec<PathBuf>,
}

impl JsonlSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }
}

/// Parse JSONL text. Blank lines are ignored and malformed lines are logged
/// and skipped.
pub fn parse_lines(text: &str, origin: &Path) -> Vec<Value> {
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    path = %origin.display(),
                    line = index + 1,
                    error = %e,
                    "skipping malformed jsonl line"
                );
            }
        }
    }
    records
}

#[async_trait]
impl RecordSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        let parts = self.fetch_parts().await?;
        Ok(parts.into_iter().flat_map(|part| part.records).collect())
    }

    async fn fetch_parts(&self) -> Result<Vec<SourcePart>, SourceError> {
        let mut parts = Vec::with_capacity(self.paths.len());

        for path in &self.paths {
            let text = match tokio::fs::read_to_string(path).await {
                Ok(text) => text,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "jsonl file not found, skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let records = parse_lines(&text, path);
            tracing::debug!(path = %path.display(), records = records.len(), "jsonl file read");
            parts.push(SourcePart {
                origin: origin_name(path),
                records,
            });
        }

        if parts.is_empty() {
            return Err(SourceError::Unavailable(
                "none of the configured jsonl files exist".to_string(),
            ));
        }
        Ok(parts)
    }
}

fn origin_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_blank_and_bad_lines() {
        let text = "{\"test_id\": \"a\"}\n\n   \nnot json\n{\"test_id\": \"b\"}\n";
        let records = parse_lines(text, Path::new("inline"));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["test_id"], "b");
    }

    #[tokio::test]
    async fn test_files_concatenate_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let training = dir.path().join("TrainingData.jsonl");
        let test = dir.path().join("TestData.jsonl");
        std::fs::write(&training, "{\"test_id\": \"t1\"}\n{\"test_id\": \"t2\"}\n").unwrap();
        std::fs::write(&test, "{\"test_id\": \"t3\"}\n").unwrap();

        let source = JsonlSource::new(vec![
            training,
            dir.path().join("missing.jsonl"),
            test,
        ]);
        let records = source.fetch().await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r["test_id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_parts_keep_per_file_counts() {
        let dir = tempfile::tempdir().unwrap();
        let training = dir.path().join("TrainingData.jsonl");
        let test = dir.path().join("TestData.jsonl");
        std::fs::write(&training, "{\"test_id\": \"t1\"}\n{\"test_id\": \"t2\"}\n").unwrap();
        std::fs::write(&test, "{\"test_id\": \"t3\"}\n").unwrap();

        let parts = JsonlSource::new(vec![training, test]).fetch_parts().await.unwrap();
        let counts: Vec<(&str, usize)> = parts
            .iter()
            .map(|p| (p.origin.as_str(), p.records.len()))
            .collect();
        assert_eq!(counts, vec![("TrainingData", 2), ("TestData", 1)]);
    }

    #[tokio::test]
    async fn test_all_missing_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = JsonlSource::new(vec![dir.path().join("a.jsonl")]);
        assert!(matches!(
            source.fetch().await,
            Err(SourceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_existing_empty_file_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.jsonl");
        std::fs::write(&path, "").unwrap();
        let records = JsonlSource::new(vec![path]).fetch().await.unwrap();
        assert!(records.is_empty());
    }
}
