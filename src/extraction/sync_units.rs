//! Discovery of the boards a connection can extract from

use super::fetcher::PaginatedFetcher;
use super::rate_limit::RateLimitGuard;
use crate::config::PageSize;
use crate::model::SyncUnit;
use crate::source::{item_id, EntityType, RawItem, SourceClient};
use crate::Result;
use tracing::{debug, warn};

/// Item type advertised for every board
pub const SYNC_UNIT_ITEM_TYPE: &str = "cards";

/// List every board visible to the credentials as a sync unit.
///
/// A rate limited listing surfaces as [`crate::SyncError::RateLimited`].
pub async fn list_sync_units(
    source: &dyn SourceClient,
    guard: &RateLimitGuard,
    page_size: PageSize,
) -> Result<Vec<SyncUnit>> {
    let fetcher = PaginatedFetcher::new(source, guard);
    let boards = fetcher.fetch_all(EntityType::Boards, "me", page_size).await?;
    debug!(count = boards.len(), "Fetched boards");

    Ok(boards.iter().filter_map(to_sync_unit).collect())
}

fn to_sync_unit(board: &RawItem) -> Option<SyncUnit> {
    let Some(id) = item_id(board) else {
        warn!("Skipping board without an id");
        return None;
    };
    let text = |field: &str| {
        board
            .get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    Some(SyncUnit {
        id: id.to_string(),
        name: text("name"),
        description: text("desc"),
        item_type: SYNC_UNIT_ITEM_TYPE.to_string(),
    })
}
