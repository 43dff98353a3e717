//! Delivery of normalized records to the sink

use crate::metrics;
use crate::model::{CanonicalRecord, Phase, PhaseState};
use crate::sink::Sink;
use crate::Result;

pub struct BatchPusher<'a> {
    sink: &'a dyn Sink,
}

impl<'a> BatchPusher<'a> {
    pub fn new(sink: &'a dyn Sink) -> Self {
        Self { sink }
    }

    /// Push `records` for `phase` and return the phase's cumulative count
    ///
    /// Accounting in `state` is only touched after the sink accepted the batch,
    /// so a failed push leaves the phase exactly as it was.
    pub async fn push(
        &self,
        phase: Phase,
        state: &mut PhaseState,
        records: &[CanonicalRecord],
    ) -> Result<u64> {
        if records.is_empty() {
            return Ok(state.pushed);
        }

        let artifact = self
            .sink
            .push(phase.as_str(), state.artifact_id.as_deref(), records)
            .await?;

        state.artifact_id = Some(artifact);
        state.pushed += records.len() as u64;
        metrics::record_pushed(phase.as_str(), records.len());

        Ok(state.pushed)
    }
}
