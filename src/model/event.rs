//! Inbound sync events and the terminal outcome of a run

use super::state::{ExtractionState, Phase};
use serde::{Deserialize, Serialize};

/// Event types delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Start,
    Continue,
    AttachmentsStart,
    AttachmentsContinue,
}

impl EventType {
    pub fn family(&self) -> EventFamily {
        match self {
            EventType::Start | EventType::Continue => EventFamily::Data,
            EventType::AttachmentsStart | EventType::AttachmentsContinue => {
                EventFamily::Attachments
            }
        }
    }
}

/// Group of phases driven by one pair of START/CONTINUE events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    /// users and cards
    Data,
    /// attachments and labels
    Attachments,
}

impl EventFamily {
    pub fn phases(&self) -> &'static [Phase] {
        match self {
            EventFamily::Data => &[Phase::Users, Phase::Cards],
            EventFamily::Attachments => &[Phase::Attachments, Phase::Labels],
        }
    }
}

/// Requested sync mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    #[default]
    Initial,
    Incremental,
}

/// Connection details forwarded by the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// `key=<api key>&token=<token>`
    pub key: String,

    /// Organization whose members form the users phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

/// One invocation of the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub event_type: EventType,

    #[serde(default)]
    pub mode: SyncMode,

    /// Board id the board-scoped phases read from
    pub external_sync_unit_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ExtractionState>,

    pub credentials: Credentials,
}

impl SyncEvent {
    pub fn new(event_type: EventType, unit_id: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            event_type,
            mode: SyncMode::Initial,
            external_sync_unit_id: unit_id.into(),
            state: None,
            credentials,
        }
    }

    pub fn with_mode(mut self, mode: SyncMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_state(mut self, state: ExtractionState) -> Self {
        self.state = Some(state);
        self
    }
}

/// One delivered batch stream per phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub item_type: String,
    pub item_count: u64,
}

/// Exactly one outcome is produced per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Done {
        artifacts: Vec<Artifact>,
    },
    Delay {
        #[serde(rename = "delaySeconds")]
        delay_seconds: u64,
    },
    Error {
        message: String,
    },
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Done { .. } => "done",
            Outcome::Delay { .. } => "delay",
            Outcome::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Outcome::Error { .. })
    }
}

/// A board the credentials can extract from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncUnit {
    pub id: String,
    pub name: String,
    pub description: String,
    pub item_type: String,
}
