//! Backward-cursor page fetching

use super::rate_limit::{Classification, RateLimitGuard};
use crate::config::PageSize;
use crate::metrics;
use crate::source::{item_id, ApiResponse, EntityType, RawItem, SourceClient};
use crate::{Result, SyncError};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// One page of raw items
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    /// The source returned as many items as requested, so older items may remain
    pub had_full_page: bool,
    /// Oldest item id of a full page; `None` once the collection is exhausted
    pub next_cursor: Option<String>,
}

pub struct PaginatedFetcher<'a> {
    source: &'a dyn SourceClient,
    guard: &'a RateLimitGuard,
}

impl<'a> PaginatedFetcher<'a> {
    pub fn new(source: &'a dyn SourceClient, guard: &'a RateLimitGuard) -> Self {
        Self { source, guard }
    }

    /// Fetch the items older than `cursor` (the newest items when `cursor` is `None`)
    pub async fn fetch(
        &self,
        entity: EntityType,
        parent_id: &str,
        cursor: Option<&str>,
        limit: PageSize,
    ) -> Result<Page> {
        let response = self
            .source
            .fetch_page(entity, parent_id, cursor, limit)
            .await?;
        self.check(entity, &response)?;
        metrics::record_page_fetched(entity.as_str());

        let items = response.data.unwrap_or_default();
        let had_full_page = items.len() >= limit.as_usize();
        let next_cursor = if had_full_page {
            let oldest = items.iter().filter_map(item_id).min().ok_or_else(|| {
                SyncError::SourceApi {
                    status: response.status.as_u16(),
                    message: format!("{} page has no item ids to continue from", entity),
                }
            })?;
            Some(oldest.to_string())
        } else {
            None
        };

        debug!(
            entity = %entity,
            cursor = ?cursor,
            count = items.len(),
            next = ?next_cursor,
            "Fetched page"
        );

        Ok(Page {
            items,
            had_full_page,
            next_cursor,
        })
    }

    /// Every page of a small auxiliary collection
    pub async fn fetch_all(
        &self,
        entity: EntityType,
        parent_id: &str,
        limit: PageSize,
    ) -> Result<Vec<RawItem>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch(entity, parent_id, cursor.as_deref(), limit).await?;
            all.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(all),
            }
        }
    }

    /// Single lookup; a missing item is `None`, not an error
    pub async fn fetch_single(&self, entity: EntityType, id: &str) -> Result<Option<RawItem>> {
        let response = self.source.fetch_single(entity, id).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.check(entity, &response)?;
        Ok(response.data)
    }

    /// Fold a non-success response into the error taxonomy
    fn check<T>(&self, entity: EntityType, response: &ApiResponse<T>) -> Result<()> {
        if let Classification::RateLimited(signal) = self.guard.classify(response) {
            warn!(entity = %entity, delay_seconds = signal.delay_seconds, "Rate limited");
            metrics::record_rate_limited(entity.as_str());
            return Err(SyncError::RateLimited(signal.delay_seconds));
        }

        match response.status {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SyncError::Auth(format!(
                "{} request rejected ({}): {}",
                entity, response.status, response.message
            ))),
            status => Err(SyncError::SourceApi {
                status: status.as_u16(),
                message: format!("{} request failed: {}", entity, response.message),
            }),
        }
    }
}
