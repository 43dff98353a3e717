//! Source API client abstraction
//!
//! The extraction core only talks to [`SourceClient`]. Endpoints, field names
//! and the auth scheme of the concrete API live in [`trello`]; [`memory`]
//! provides a scripted fake for tests.

pub mod memory;
pub mod retry;
pub mod trello;

pub use memory::{MemorySource, PageCall};
pub use trello::{TrelloClient, TrelloCredentials};

use crate::config::PageSize;
use crate::model::Phase;
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fmt;

/// Untyped item as returned by the source
pub type RawItem = serde_json::Value;

/// Kinds of entity the source can return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Users,
    Cards,
    /// Cards carrying their attachment lists
    Attachments,
    Labels,
    /// Board lists, used to derive card stages
    Lists,
    /// Boards visible to the credentials
    Boards,
    /// The action that created a card
    CardCreateAction,
}

impl EntityType {
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Users => EntityType::Users,
            Phase::Cards => EntityType::Cards,
            Phase::Attachments => EntityType::Attachments,
            Phase::Labels => EntityType::Labels,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Users => "users",
            EntityType::Cards => "cards",
            EntityType::Attachments => "attachments",
            EntityType::Labels => "labels",
            EntityType::Lists => "lists",
            EntityType::Boards => "boards",
            EntityType::CardCreateAction => "card_create_action",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response that reached the source and came back with a status
///
/// Transport failures with no status are reported as `Err` by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub status: StatusCode,
    /// Raw Retry-After hint, passed through uninterpreted
    pub retry_after: Option<String>,
    pub data: Option<T>,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            retry_after: None,
            data: Some(data),
            message: String::new(),
        }
    }

    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            data: None,
            message: message.into(),
        }
    }

    pub fn rate_limited(retry_after: Option<&str>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            retry_after: retry_after.map(String::from),
            data: None,
            message: "Too Many Requests".to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            status: self.status,
            retry_after: self.retry_after,
            data: self.data.map(f),
            message: self.message,
        }
    }
}

/// Source API collaborator
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch up to `limit` items older than `cursor` (newest first when `cursor` is `None`)
    async fn fetch_page(
        &self,
        entity: EntityType,
        parent_id: &str,
        cursor: Option<&str>,
        limit: PageSize,
    ) -> Result<ApiResponse<Vec<RawItem>>>;

    /// Fetch a single item by id
    async fn fetch_single(&self, entity: EntityType, id: &str) -> Result<ApiResponse<RawItem>>;
}

/// Id of a raw item, if it has one
pub fn item_id(item: &RawItem) -> Option<&str> {
    item.get("id").and_then(|v| v.as_str())
}

/// Backward paging over a full result set: newest first, strictly older than `cursor`
pub fn page_before(mut items: Vec<RawItem>, cursor: Option<&str>, limit: PageSize) -> Vec<RawItem> {
    items.sort_by(|a, b| item_id(b).cmp(&item_id(a)));
    items
        .into_iter()
        .filter(|item| match (cursor, item_id(item)) {
            (Some(cursor), Some(id)) => id < cursor,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .take(limit.as_usize())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(ids: &[&str]) -> Vec<RawItem> {
        ids.iter().map(|id| json!({ "id": id })).collect()
    }

    fn ids(items: &[RawItem]) -> Vec<&str> {
        items.iter().filter_map(item_id).collect()
    }

    #[test]
    fn test_page_before_newest_first() {
        let page = page_before(items(&["a1", "c3", "b2"]), None, PageSize::new(2).unwrap());
        assert_eq!(ids(&page), vec!["c3", "b2"]);
    }

    #[test]
    fn test_page_before_cursor_is_exclusive() {
        let page = page_before(
            items(&["a1", "c3", "b2"]),
            Some("b2"),
            PageSize::new(10).unwrap(),
        );
        assert_eq!(ids(&page), vec!["a1"]);
    }

    #[test]
    fn test_entity_for_phase() {
        assert_eq!(EntityType::for_phase(Phase::Users), EntityType::Users);
        assert_eq!(EntityType::for_phase(Phase::Labels), EntityType::Labels);
        assert_eq!(EntityType::CardCreateAction.as_str(), "card_create_action");
    }

    #[test]
    fn test_api_response_map() {
        let response = ApiResponse::ok(vec![1, 2, 3]).map(|v| v.len());
        assert!(response.is_success());
        assert_eq!(response.data, Some(3));

        let limited: ApiResponse<()> = ApiResponse::rate_limited(Some("30"));
        assert_eq!(limited.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.retry_after.as_deref(), Some("30"));
    }
}
