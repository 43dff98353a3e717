//! Extraction orchestration
//!
//! Control flow for one invocation:
//! 1. [`Extractor`] validates the event and prepares state ([`SyncModeResolver`] on START)
//! 2. [`PhaseOrchestrator`] runs the family's phases in order, page by page,
//!    through [`PaginatedFetcher`] + [`RateLimitGuard`], the normalizer and
//!    [`BatchPusher`], persisting the cursor after every page
//! 3. The first rate limit or fatal error stops the run; exactly one
//!    [`Outcome`](crate::model::Outcome) is returned

mod fetcher;
mod orchestrator;
mod pusher;
mod rate_limit;
mod runner;
mod sync_mode;
mod sync_units;

pub use fetcher::{Page, PaginatedFetcher};
pub use orchestrator::{PhaseOrchestrator, RunScope};
pub use pusher::BatchPusher;
pub use rate_limit::{parse_retry_after, Classification, RateLimitGuard, RateLimitSignal};
pub use runner::{Extractor, ExtractorSettings};
pub use sync_mode::SyncModeResolver;
pub use sync_units::list_sync_units;
