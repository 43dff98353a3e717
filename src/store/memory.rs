//! In-memory state store for tests

use super::StateStore;
use crate::model::ExtractionState;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
struct UnitEntry {
    state: Option<ExtractionState>,
    current_start: Option<DateTime<Utc>>,
    last_successful_start: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryStateStore {
    units: Mutex<HashMap<String, UnitEntry>>,
    saves: AtomicUsize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the marker a previous successful run would have left
    pub fn with_last_successful_start(self, unit_id: &str, at: DateTime<Utc>) -> Self {
        self.with_entry(unit_id, |e| e.last_successful_start = Some(at));
        self
    }

    pub fn with_state(self, unit_id: &str, state: ExtractionState) -> Self {
        self.with_entry(unit_id, |e| e.state = Some(state));
        self
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current_start(&self, unit_id: &str) -> Option<DateTime<Utc>> {
        self.with_entry(unit_id, |e| e.current_start)
    }

    fn units(&self) -> MutexGuard<'_, HashMap<String, UnitEntry>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_entry<R>(&self, unit_id: &str, f: impl FnOnce(&mut UnitEntry) -> R) -> R {
        f(self.units().entry(unit_id.to_string()).or_default())
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, unit_id: &str) -> Result<Option<ExtractionState>> {
        Ok(self.with_entry(unit_id, |e| e.state.clone()))
    }

    fn save(&self, unit_id: &str, state: &ExtractionState) -> Result<()> {
        self.with_entry(unit_id, |e| e.state = Some(state.clone()));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self, unit_id: &str) -> Result<()> {
        self.units().remove(unit_id);
        Ok(())
    }

    fn begin_run(&self, unit_id: &str, started_at: DateTime<Utc>) -> Result<()> {
        self.with_entry(unit_id, |e| e.current_start = Some(started_at));
        Ok(())
    }

    fn complete_run(&self, unit_id: &str) -> Result<()> {
        self.with_entry(unit_id, |e| {
            if let Some(started) = e.current_start.take() {
                e.last_successful_start = Some(started);
            }
        });
        Ok(())
    }

    fn last_successful_start(&self, unit_id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.with_entry(unit_id, |e| e.last_successful_start))
    }
}
