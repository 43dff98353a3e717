//! Downstream sink abstraction
//!
//! A sink receives batches of canonical records for one item type. Each phase
//! of a run appends to a single artifact: the first push opens it and returns
//! its handle, later pushes pass the handle back.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;

use crate::model::CanonicalRecord;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver `records`, appending to `artifact` when given. Returns the artifact handle.
    ///
    /// Delivery is at-least-once; consumers deduplicate by record id.
    async fn push(
        &self,
        item_type: &str,
        artifact: Option<&str>,
        records: &[CanonicalRecord],
    ) -> Result<String>;
}
