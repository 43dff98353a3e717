//! Core data model
//!
//! - **state**: per-phase cursors and run accounting ([`ExtractionState`])
//! - **record**: normalized output ([`CanonicalRecord`])
//! - **event**: inbound sync events and terminal outcomes

mod event;
mod record;
mod state;

pub use event::{Artifact, Credentials, EventFamily, EventType, Outcome, SyncEvent, SyncMode, SyncUnit};
pub use record::{CanonicalRecord, RichText, Value};
pub use state::{ExtractionState, Phase, PhaseState};
