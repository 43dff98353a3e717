//! JSONL artifact files
//!
//! Each artifact is one `<artifact id>.jsonl` file in the artifact directory,
//! one canonical record per line.

use super::Sink;
use crate::model::CanonicalRecord;
use crate::{Result, SyncError};
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub struct JsonlSink {
    dir: PathBuf,
    sequence: AtomicU64,
}

impl JsonlSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// File backing an artifact handle
    ///
    /// Handles come back from the host inside the saved state, so anything
    /// that could leave the artifact directory is rejected.
    pub fn artifact_path(&self, artifact: &str) -> Result<PathBuf> {
        let invalid = artifact.is_empty()
            || artifact.starts_with('.')
            || artifact.contains(|c: char| matches!(c, '/' | '\\' | '\0'))
            || artifact.contains("..");
        if invalid {
            return Err(SyncError::Sink(format!("Invalid artifact id '{}'", artifact)));
        }
        Ok(self.dir.join(format!("{}.jsonl", artifact)))
    }

    fn new_artifact_id(&self, item_type: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}-{}-{}",
            item_type,
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            seq
        )
    }
}

/// Read back every record line of an artifact file
pub fn read_artifact(path: impl AsRef<Path>) -> Result<Vec<serde_json::Value>> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| SyncError::Sink(format!("Invalid JSONL line: {}", e)))
        })
        .collect()
}

#[async_trait]
impl Sink for JsonlSink {
    async fn push(
        &self,
        item_type: &str,
        artifact: Option<&str>,
        records: &[CanonicalRecord],
    ) -> Result<String> {
        let artifact = match artifact {
            Some(id) => id.to_string(),
            None => self.new_artifact_id(item_type),
        };

        let mut buffer = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let path = self.artifact_path(&artifact)?;
        fs::create_dir_all(&self.dir).await?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| SyncError::Sink(format!("{}: {}", path.display(), e)))?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        tracing::debug!(
            item_type,
            artifact = %artifact,
            count = records.len(),
            "Appended records to artifact"
        );

        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str) -> CanonicalRecord {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        CanonicalRecord::new(id, at, at)
    }

    #[tokio::test]
    async fn test_push_appends_to_one_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path().join("artifacts"));

        let artifact = sink
            .push("cards", None, &[record("a"), record("b")])
            .await
            .unwrap();
        assert!(artifact.starts_with("cards-"));

        let same = sink
            .push("cards", Some(artifact.as_str()), &[record("c")])
            .await
            .unwrap();
        assert_eq!(same, artifact);

        let lines = read_artifact(sink.artifact_path(&artifact).unwrap()).unwrap();
        let ids: Vec<_> = lines.iter().map(|l| l["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_new_artifacts_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path());

        let first = sink.push("users", None, &[record("a")]).await.unwrap();
        let second = sink.push("users", None, &[record("b")]).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_rejects_artifact_ids_outside_the_directory() {
        let temp_dir = TempDir::new().unwrap();
        let sink = JsonlSink::new(temp_dir.path().join("artifacts"));

        for bad in ["../escape", "nested/cards-1", "..", "", "a\\b"] {
            let result = sink.push("cards", Some(bad), &[record("a")]).await;
            assert!(matches!(result, Err(SyncError::Sink(_))), "{:?}", bad);
        }
        assert!(!temp_dir.path().join("escape.jsonl").exists());
        assert!(sink.artifact_path("cards-20240101T000000.000000-0").is_ok());
    }
}
