//! cardsync - Trello work-item extraction
//!
//! cardsync pulls users, cards, attachments and labels out of a Trello board,
//! normalizes them into canonical records and pushes them to a sink in batches.
//! Each sync event runs until its phases are done or the source rate limits
//! it, and the persisted extraction state lets the next event pick up exactly
//! where the previous one stopped.
//!
//! # Architecture
//!
//! - **model**: Events, outcomes, extraction state and canonical records
//! - **config**: YAML configuration and validation
//! - **source**: Source API client (Trello) and an in-memory double
//! - **normalize**: Raw item to canonical record conversion
//! - **extraction**: Sync mode resolution, paging, rate limits and the run boundary
//! - **sink**: Artifact uploads (JSONL files)
//! - **store**: Extraction state and run marker persistence (SQLite)

// Core modules
pub mod config;
pub mod error;
pub mod model;

// Components
pub mod extraction;
pub mod normalize;
pub mod sink;
pub mod source;
pub mod store;

// Utilities
pub mod logging;
pub mod metrics;

// Re-exports
pub use error::{ErrorClass, Result, SyncError};
