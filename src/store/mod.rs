//! Host-side persistence
//!
//! Stores the [`ExtractionState`] of each sync unit between invocations and
//! the run markers that drive INCREMENTAL mode:
//! - `begin_run` records when the current run started, before any fetch
//! - `complete_run` promotes that marker to "last successful start"

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;

use crate::model::ExtractionState;
use crate::Result;
use chrono::{DateTime, Utc};

/// Persistence for extraction state and run markers, keyed by sync unit id
pub trait StateStore: Send + Sync {
    fn load(&self, unit_id: &str) -> Result<Option<ExtractionState>>;

    fn save(&self, unit_id: &str, state: &ExtractionState) -> Result<()>;

    /// Forget both state and run markers
    fn clear(&self, unit_id: &str) -> Result<()>;

    fn begin_run(&self, unit_id: &str, started_at: DateTime<Utc>) -> Result<()>;

    /// Promote the current run's start to last successful start
    fn complete_run(&self, unit_id: &str) -> Result<()>;

    fn last_successful_start(&self, unit_id: &str) -> Result<Option<DateTime<Utc>>>;
}
