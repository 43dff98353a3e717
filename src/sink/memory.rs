//! In-memory sink for tests, with failure injection

use super::Sink;
use crate::model::CanonicalRecord;
use crate::{Result, SyncError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
struct StoredArtifact {
    item_type: String,
    records: Vec<CanonicalRecord>,
}

#[derive(Default)]
pub struct MemorySink {
    artifacts: Mutex<BTreeMap<String, StoredArtifact>>,
    pushes: Mutex<Vec<(String, usize)>>,
    fail_next: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next push
    pub fn fail_next_push(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Ids of every record delivered for `item_type`, in push order
    pub fn pushed_ids(&self, item_type: &str) -> Vec<String> {
        self.records(item_type).into_iter().map(|r| r.id).collect()
    }

    pub fn records(&self, item_type: &str) -> Vec<CanonicalRecord> {
        lock(&self.artifacts)
            .values()
            .filter(|a| a.item_type == item_type)
            .flat_map(|a| a.records.clone())
            .collect()
    }

    /// (item type, batch size) of every accepted push
    pub fn pushes(&self) -> Vec<(String, usize)> {
        lock(&self.pushes).clone()
    }

    pub fn artifact_len(&self, artifact: &str) -> Option<usize> {
        lock(&self.artifacts).get(artifact).map(|a| a.records.len())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl Sink for MemorySink {
    async fn push(
        &self,
        item_type: &str,
        artifact: Option<&str>,
        records: &[CanonicalRecord],
    ) -> Result<String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(SyncError::Sink(format!("{} batch rejected", item_type)));
        }

        let mut artifacts = lock(&self.artifacts);
        let id = match artifact {
            Some(id) => id.to_string(),
            None => format!("{}-{}", item_type, artifacts.len() + 1),
        };
        artifacts
            .entry(id.clone())
            .or_insert_with(|| StoredArtifact {
                item_type: item_type.to_string(),
                records: Vec::new(),
            })
            .records
            .extend_from_slice(records);
        lock(&self.pushes).push((item_type.to_string(), records.len()));

        Ok(id)
    }
}
