//! Phase-by-phase extraction driver

use super::fetcher::PaginatedFetcher;
use super::pusher::BatchPusher;
use super::rate_limit::RateLimitGuard;
use crate::config::PageSize;
use crate::metrics;
use crate::model::{Artifact, CanonicalRecord, EventFamily, ExtractionState, Phase};
use crate::normalize::{self, NormalizeContext};
use crate::sink::Sink;
use crate::source::{EntityType, SourceClient};
use crate::store::StateStore;
use crate::{Result, SyncError};
use tracing::{debug, info, warn};

/// Identifiers one run is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScope {
    /// Board id; parent of the board-scoped phases and key of the persisted state
    pub unit_id: String,
    /// Organization whose members form the users phase
    pub org_id: Option<String>,
}

impl RunScope {
    fn parent_id(&self, phase: Phase) -> Result<&str> {
        match phase {
            Phase::Users => self
                .org_id
                .as_deref()
                .ok_or_else(|| SyncError::Config("org_id is required for the users phase".into())),
            Phase::Cards | Phase::Attachments | Phase::Labels => Ok(&self.unit_id),
        }
    }
}

pub struct PhaseOrchestrator<'a> {
    source: &'a dyn SourceClient,
    sink: &'a dyn Sink,
    store: &'a dyn StateStore,
    guard: &'a RateLimitGuard,
    page_size: PageSize,
    base_url: String,
}

impl<'a> PhaseOrchestrator<'a> {
    pub fn new(
        source: &'a dyn SourceClient,
        sink: &'a dyn Sink,
        store: &'a dyn StateStore,
        guard: &'a RateLimitGuard,
        page_size: PageSize,
    ) -> Self {
        Self {
            source,
            sink,
            store,
            guard,
            page_size,
            base_url: crate::config::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Base URL hosted attachment links are rewritten against
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run every incomplete phase of `family` to completion
    ///
    /// Returns the artifacts of the family once all its phases are complete.
    /// A rate limit or fatal error stops the run at the page it happened on;
    /// every earlier page has already been persisted.
    pub async fn run(
        &self,
        scope: &RunScope,
        family: EventFamily,
        state: &mut ExtractionState,
    ) -> Result<Vec<Artifact>> {
        for &phase in family.phases() {
            if state.phase(phase).completed {
                debug!(phase = %phase, "Phase already complete");
                continue;
            }
            self.run_phase(scope, phase, state).await?;
        }
        Ok(state.artifacts(family))
    }

    async fn run_phase(
        &self,
        scope: &RunScope,
        phase: Phase,
        state: &mut ExtractionState,
    ) -> Result<()> {
        let fetcher = PaginatedFetcher::new(self.source, self.guard);
        let pusher = BatchPusher::new(self.sink);
        let entity = EntityType::for_phase(phase);
        let parent_id = scope.parent_id(phase)?;
        let ctx = self.context_for(phase, scope, &fetcher).await?;

        info!(
            phase = %phase,
            cursor = ?state.phase(phase).cursor,
            modified_since = ?state.phase(phase).modified_since,
            "Starting phase"
        );

        loop {
            let cursor = state.phase(phase).cursor.clone();
            let page = fetcher
                .fetch(entity, parent_id, cursor.as_deref(), self.page_size)
                .await?;
            let exhausted = !page.had_full_page;

            let mut records = Vec::with_capacity(page.items.len());
            let mut failed = 0u64;
            for raw in page
                .items
                .into_iter()
                .flat_map(|item| normalize::expand(phase, item))
            {
                match normalize::normalize(phase, &raw, &ctx) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        failed += 1;
                        metrics::record_normalization_error(phase.as_str());
                        let err = SyncError::from(e);
                        warn!(
                            phase = %phase,
                            id = normalize_id(&raw),
                            class = ?err.class(),
                            "Dropping record: {}",
                            err
                        );
                    }
                }
            }
            let normalized = records.len() as u64;

            // The phase ends here; nothing of it could be mapped
            let phase_state = state.phase(phase);
            let total_failed = phase_state.failed + failed;
            if exhausted && total_failed > 0 && phase_state.normalized + normalized == 0 {
                return Err(SyncError::SystemicNormalization {
                    phase: phase.to_string(),
                    failed: total_failed as usize,
                });
            }

            if let Some(since) = phase_state.modified_since {
                records.retain(|r| r.modified_date > since);
            }

            if phase == Phase::Cards {
                self.attach_creators(&fetcher, &mut records).await?;
            }

            let phase_state = state.phase_mut(phase);
            let total = pusher.push(phase, phase_state, &records).await?;
            phase_state.normalized += normalized;
            phase_state.failed += failed;
            phase_state.advance(if exhausted { None } else { page.next_cursor });
            self.store.save(&scope.unit_id, state)?;

            debug!(
                phase = %phase,
                pushed = records.len(),
                total,
                "Page done"
            );

            if exhausted {
                break;
            }
        }

        let phase_state = state.phase(phase);
        info!(
            phase = %phase,
            pushed = phase_state.pushed,
            dropped = phase_state.failed,
            "Phase complete"
        );
        Ok(())
    }

    /// Board lists feed the card stage mapping
    async fn context_for(
        &self,
        phase: Phase,
        scope: &RunScope,
        fetcher: &PaginatedFetcher<'_>,
    ) -> Result<NormalizeContext> {
        let ctx = NormalizeContext::new(self.base_url.clone());
        if phase != Phase::Cards {
            return Ok(ctx);
        }
        let lists = fetcher
            .fetch_all(EntityType::Lists, &scope.unit_id, self.page_size)
            .await?;
        Ok(ctx.with_lists(&lists))
    }

    /// Look up who created each card. Cards with no create action keep no creator.
    async fn attach_creators(
        &self,
        fetcher: &PaginatedFetcher<'_>,
        records: &mut [CanonicalRecord],
    ) -> Result<()> {
        for record in records.iter_mut() {
            let action = fetcher
                .fetch_single(EntityType::CardCreateAction, &record.id)
                .await?;
            let creator = action
                .as_ref()
                .and_then(|a| a.get("idMemberCreator"))
                .and_then(|c| c.as_str());
            if let Some(creator) = creator {
                normalize::attach_creator(record, creator);
            }
        }
        Ok(())
    }
}

fn normalize_id(raw: &crate::source::RawItem) -> &str {
    crate::source::item_id(raw).unwrap_or("<none>")
}
