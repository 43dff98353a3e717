//! INITIAL vs INCREMENTAL baseline

use crate::model::{ExtractionState, Phase, SyncMode};
use crate::{Result, SyncError};
use chrono::{DateTime, Utc};

pub struct SyncModeResolver;

impl SyncModeResolver {
    /// Compute the state a START event begins from
    ///
    /// INCREMENTAL reopens the filterable phases with `modifiedSince` set to
    /// the previous successful run's start and leaves every other phase as it
    /// was. Without that timestamp INCREMENTAL is refused rather than widened
    /// to a full sync.
    pub fn resolve(
        mode: SyncMode,
        prior: Option<ExtractionState>,
        previous_run_start: Option<DateTime<Utc>>,
    ) -> Result<ExtractionState> {
        match mode {
            SyncMode::Initial => Ok(ExtractionState::new()),
            SyncMode::Incremental => {
                let since = previous_run_start.ok_or_else(|| {
                    SyncError::Config(
                        "INCREMENTAL sync requires the start time of the previous successful run"
                            .to_string(),
                    )
                })?;

                let mut state = prior.unwrap_or_default();
                for phase in Phase::ORDER {
                    if phase.is_filterable() {
                        state.phase_mut(phase).restart(Some(since));
                    }
                }
                Ok(state)
            }
        }
    }
}
