//! Extraction state threaded through every phase of a run

use super::event::{Artifact, EventFamily};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One entity type's extraction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Users,
    Cards,
    Attachments,
    Labels,
}

impl Phase {
    /// Fixed execution order
    pub const ORDER: [Phase; 4] = [Phase::Users, Phase::Cards, Phase::Attachments, Phase::Labels];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Users => "users",
            Phase::Cards => "cards",
            Phase::Attachments => "attachments",
            Phase::Labels => "labels",
        }
    }

    /// The event family that drives this phase
    pub fn family(&self) -> EventFamily {
        match self {
            Phase::Users | Phase::Cards => EventFamily::Data,
            Phase::Attachments | Phase::Labels => EventFamily::Attachments,
        }
    }

    /// Phases that support modification-time filtering under INCREMENTAL mode
    pub fn is_filterable(&self) -> bool {
        matches!(self, Phase::Cards | Phase::Attachments)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a single phase
///
/// `cursor` is present only while the phase is partially complete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    #[serde(default)]
    pub completed: bool,

    /// Oldest item id already handled; the next page holds items older than this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,

    /// Set only under INCREMENTAL mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_since: Option<DateTime<Utc>>,

    /// Records pushed during the current logical run
    #[serde(default)]
    pub pushed: u64,

    /// Sink handle the records of this run were appended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_id: Option<String>,

    /// Records normalized during the current logical run, before any incremental filter
    #[serde(default)]
    pub normalized: u64,

    /// Records dropped by the normalizer during the current logical run
    #[serde(default)]
    pub failed: u64,
}

impl PhaseState {
    /// Record a finished page. `None` means the phase is exhausted.
    pub fn advance(&mut self, next_cursor: Option<String>) {
        match next_cursor {
            Some(cursor) => {
                self.cursor = Some(cursor);
                self.completed = false;
            }
            None => {
                self.cursor = None;
                self.completed = true;
            }
        }
    }

    /// Force a full rescan, optionally filtered to records modified after `since`
    pub fn restart(&mut self, since: Option<DateTime<Utc>>) {
        self.completed = false;
        self.cursor = None;
        self.modified_since = since;
    }

    pub fn reset_accounting(&mut self) {
        self.pushed = 0;
        self.artifact_id = None;
        self.normalized = 0;
        self.failed = 0;
    }

    pub fn is_partial(&self) -> bool {
        !self.completed && self.cursor.is_some()
    }
}

/// Per-phase progress of one sync unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionState {
    #[serde(default)]
    pub users: PhaseState,
    #[serde(default)]
    pub cards: PhaseState,
    #[serde(default)]
    pub attachments: PhaseState,
    #[serde(default)]
    pub labels: PhaseState,
}

impl ExtractionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Users => &self.users,
            Phase::Cards => &self.cards,
            Phase::Attachments => &self.attachments,
            Phase::Labels => &self.labels,
        }
    }

    pub fn phase_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Users => &mut self.users,
            Phase::Cards => &mut self.cards,
            Phase::Attachments => &mut self.attachments,
            Phase::Labels => &mut self.labels,
        }
    }

    /// True once every phase of the family is completed
    pub fn family_complete(&self, family: EventFamily) -> bool {
        family.phases().iter().all(|p| self.phase(*p).completed)
    }

    /// Clear pushed counts and artifact handles of the family's phases
    pub fn reset_accounting(&mut self, family: EventFamily) {
        for phase in family.phases() {
            self.phase_mut(*phase).reset_accounting();
        }
    }

    /// One artifact per phase of the family that pushed at least one record
    pub fn artifacts(&self, family: EventFamily) -> Vec<Artifact> {
        family
            .phases()
            .iter()
            .filter_map(|phase| {
                let state = self.phase(*phase);
                match (&state.artifact_id, state.pushed) {
                    (Some(id), pushed) if pushed > 0 => Some(Artifact {
                        id: id.clone(),
                        item_type: phase.as_str().to_string(),
                        item_count: pushed,
                    }),
                    _ => None,
                }
            })
            .collect()
    }
}
