//! Run boundary: one sync event in, exactly one outcome out

use super::orchestrator::{PhaseOrchestrator, RunScope};
use super::rate_limit::RateLimitGuard;
use super::sync_mode::SyncModeResolver;
use crate::config::{ExtractorConfig, PageSize, DEFAULT_BASE_URL};
use crate::metrics;
use crate::model::{Artifact, EventFamily, EventType, ExtractionState, Outcome, SyncEvent};
use crate::sink::Sink;
use crate::source::{SourceClient, TrelloCredentials};
use crate::store::StateStore;
use crate::{Result, SyncError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// Tunables of a run
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub page_size: PageSize,
    pub default_delay_secs: u64,
    pub base_url: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            page_size: PageSize::DEFAULT,
            default_delay_secs: 5,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl From<&ExtractorConfig> for ExtractorSettings {
    fn from(config: &ExtractorConfig) -> Self {
        Self {
            page_size: config.source.page_size,
            default_delay_secs: config.rate_limit.default_delay_secs,
            base_url: config.source.effective_base_url(),
        }
    }
}

pub struct Extractor {
    source: Arc<dyn SourceClient>,
    sink: Arc<dyn Sink>,
    store: Arc<dyn StateStore>,
    settings: ExtractorSettings,
    guard: RateLimitGuard,
}

impl Extractor {
    pub fn new(
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn Sink>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Self::with_settings(source, sink, store, ExtractorSettings::default())
    }

    pub fn with_settings(
        source: Arc<dyn SourceClient>,
        sink: Arc<dyn Sink>,
        store: Arc<dyn StateStore>,
        settings: ExtractorSettings,
    ) -> Self {
        let guard = RateLimitGuard::new(settings.default_delay_secs);
        Self {
            source,
            sink,
            store,
            settings,
            guard,
        }
    }

    /// Handle one event. Every failure is folded into the returned outcome.
    pub async fn handle(&self, event: SyncEvent) -> Outcome {
        let unit_id = event.external_sync_unit_id.clone();
        let event_type = event.event_type;

        let outcome = match self.execute(event).await {
            Ok(artifacts) => Outcome::Done { artifacts },
            Err(SyncError::RateLimited(delay_seconds)) => Outcome::Delay { delay_seconds },
            Err(e) => {
                error!(
                    unit = %unit_id,
                    event = ?event_type,
                    class = ?e.class(),
                    "Run failed: {}",
                    e
                );
                Outcome::Error {
                    message: e.to_string(),
                }
            }
        };

        metrics::record_outcome(outcome.label());
        info!(unit = %unit_id, event = ?event_type, outcome = outcome.label(), "Run finished");
        outcome
    }

    async fn execute(&self, event: SyncEvent) -> Result<Vec<Artifact>> {
        validate_event(&event)?;

        let family = event.event_type.family();
        let scope = RunScope {
            unit_id: event.external_sync_unit_id.clone(),
            org_id: event.credentials.org_id.clone(),
        };

        let mut state = self.prepare_state(event)?;
        self.store.save(&scope.unit_id, &state)?;

        let orchestrator = PhaseOrchestrator::new(
            self.source.as_ref(),
            self.sink.as_ref(),
            self.store.as_ref(),
            &self.guard,
            self.settings.page_size,
        )
        .with_base_url(self.settings.base_url.clone());

        let artifacts = orchestrator.run(&scope, family, &mut state).await?;

        if family == EventFamily::Data {
            self.store.complete_run(&scope.unit_id)?;
        }
        Ok(artifacts)
    }

    /// State the orchestrator starts from for this event
    fn prepare_state(&self, event: SyncEvent) -> Result<ExtractionState> {
        let unit_id = event.external_sync_unit_id.as_str();

        match event.event_type {
            EventType::Start => {
                let previous_start = self.store.last_successful_start(unit_id)?;
                let prior = match event.state {
                    Some(state) => Some(state),
                    None => self.store.load(unit_id)?,
                };
                let mut state = SyncModeResolver::resolve(event.mode, prior, previous_start)?;
                self.store.begin_run(unit_id, Utc::now())?;
                state.reset_accounting(EventFamily::Data);
                Ok(state)
            }
            EventType::AttachmentsStart => {
                let mut state = match event.state {
                    Some(state) => state,
                    None => self.store.load(unit_id)?.unwrap_or_default(),
                };
                state.reset_accounting(EventFamily::Attachments);
                Ok(state)
            }
            EventType::Continue | EventType::AttachmentsContinue => match event.state {
                Some(state) => Ok(state),
                None => self.store.load(unit_id)?.ok_or_else(|| {
                    SyncError::Config(format!(
                        "{:?} for '{}' has no saved state to resume",
                        event.event_type, unit_id
                    ))
                }),
            },
        }
    }
}

fn validate_event(event: &SyncEvent) -> Result<()> {
    if event.external_sync_unit_id.trim().is_empty() {
        return Err(SyncError::Config("external_sync_unit_id is empty".to_string()));
    }
    TrelloCredentials::parse(&event.credentials.key)?;
    let org_missing = event
        .credentials
        .org_id
        .as_deref()
        .map_or(true, |o| o.trim().is_empty());
    if event.event_type.family() == EventFamily::Data && org_missing {
        return Err(SyncError::Config("credentials org_id is required".to_string()));
    }
    Ok(())
}
