//! Trello REST client
//!
//! Implements [`SourceClient`] over the Trello v1 API. Cards are paged
//! server-side with `before`; endpoints that return a whole collection
//! (members, labels, lists, boards) are paged client-side with the same
//! newest-first, older-than-cursor semantics.

use super::retry::{with_retry, RetryConfig};
use super::{page_before, ApiResponse, EntityType, RawItem, SourceClient};
use crate::config::{PageSize, SourceSettings};
use crate::model::Credentials;
use crate::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// API key and token parsed from a connection key
#[derive(Clone, PartialEq, Eq)]
pub struct TrelloCredentials {
    pub api_key: String,
    pub token: String,
}

impl std::fmt::Debug for TrelloCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrelloCredentials")
            .field("api_key", &self.api_key)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl TrelloCredentials {
    /// Parse `key=<api key>&token=<token>`; values may be URL-encoded
    pub fn parse(connection_key: &str) -> Result<Self> {
        let mut api_key = None;
        let mut token = None;

        for pair in connection_key.trim().split('&') {
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let value = urlencoding::decode(value)
                .map_err(|e| SyncError::Config(format!("Invalid connection key encoding: {}", e)))?
                .into_owned();
            match name.trim() {
                "key" => api_key = Some(value),
                "token" => token = Some(value),
                _ => {}
            }
        }

        match (api_key, token) {
            (Some(api_key), Some(token)) if !api_key.is_empty() && !token.is_empty() => {
                Ok(Self { api_key, token })
            }
            _ => Err(SyncError::Config(
                "Connection key must have the form key=<api key>&token=<token>".to_string(),
            )),
        }
    }
}

/// Trello API client
pub struct TrelloClient {
    client: Client,
    base_url: String,
    credentials: TrelloCredentials,
    org_id: Option<String>,
    retry: RetryConfig,
}

impl TrelloClient {
    pub fn new(credentials: &Credentials, settings: &SourceSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.effective_base_url(),
            credentials: TrelloCredentials::parse(&credentials.key)?,
            org_id: credentials.org_id.clone().filter(|o| !o.trim().is_empty()),
            retry: RetryConfig::default(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn org_id(&self) -> Result<&str> {
        self.org_id
            .as_deref()
            .ok_or_else(|| SyncError::Config("Organization id is required to extract users".into()))
    }

    /// GET `path` with credentials attached. Only transport failures are `Err`.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse<serde_json::Value>> {
        let url = format!("{}{}", self.base_url, path);
        let mut params: Vec<(&str, String)> = vec![
            ("key", self.credentials.api_key.clone()),
            ("token", self.credentials.token.clone()),
        ];
        params.extend(query.iter().cloned());

        debug!(path, "GET");

        let response = with_retry(&self.retry, path, || {
            let request = self.client.get(&url).query(&params);
            async move { request.send().await.map_err(SyncError::from) }
        })
        .await?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(ApiResponse::ok(response.json().await?)),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let mut limited = ApiResponse::rate_limited(retry_after.as_deref());
                limited.message = response.text().await.unwrap_or_default();
                Ok(limited)
            }
            _ => {
                let message = response.text().await.unwrap_or_default();
                Ok(ApiResponse::status(status, message))
            }
        }
    }

    /// Collection endpoint paged locally
    async fn get_collection(
        &self,
        path: &str,
        query: &[(&str, String)],
        cursor: Option<&str>,
        limit: PageSize,
    ) -> Result<ApiResponse<Vec<RawItem>>> {
        let response = into_items(self.get(path, query).await?)?;
        Ok(response.map(|items| page_before(items, cursor, limit)))
    }

    /// Card listing paged by the API
    async fn get_cards(
        &self,
        board_id: &str,
        cursor: Option<&str>,
        limit: PageSize,
        with_attachments: bool,
    ) -> Result<ApiResponse<Vec<RawItem>>> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = cursor {
            query.push(("before", before.to_string()));
        }
        if with_attachments {
            query.push(("attachments", "true".to_string()));
            query.push(("fields", "id,dateLastActivity".to_string()));
        }
        into_items(self.get(&format!("/boards/{}/cards", board_id), &query).await?)
    }
}

/// Require a JSON array body on success
fn into_items(response: ApiResponse<serde_json::Value>) -> Result<ApiResponse<Vec<RawItem>>> {
    if matches!(response.data, Some(ref body) if !body.is_array()) {
        return Err(SyncError::SourceApi {
            status: response.status.as_u16(),
            message: "Expected a JSON array".to_string(),
        });
    }
    Ok(response.map(|body| match body {
        serde_json::Value::Array(items) => items,
        _ => Vec::new(),
    }))
}

#[async_trait]
impl SourceClient for TrelloClient {
    async fn fetch_page(
        &self,
        entity: EntityType,
        parent_id: &str,
        cursor: Option<&str>,
        limit: PageSize,
    ) -> Result<ApiResponse<Vec<RawItem>>> {
        match entity {
            EntityType::Users => {
                let path = format!("/organizations/{}/members", self.org_id()?);
                let query = [("fields", "fullName,username".to_string())];
                self.get_collection(&path, &query, cursor, limit).await
            }
            EntityType::Cards => self.get_cards(parent_id, cursor, limit, false).await,
            EntityType::Attachments => self.get_cards(parent_id, cursor, limit, true).await,
            EntityType::Labels => {
                let path = format!("/boards/{}/labels", parent_id);
                let query = [("limit", "1000".to_string())];
                self.get_collection(&path, &query, cursor, limit).await
            }
            EntityType::Lists => {
                let path = format!("/boards/{}/lists", parent_id);
                self.get_collection(&path, &[], cursor, limit).await
            }
            EntityType::Boards => {
                let query = [("fields", "name,desc".to_string())];
                self.get_collection("/members/me/boards", &query, cursor, limit)
                    .await
            }
            EntityType::CardCreateAction => Err(SyncError::Config(
                "card create actions are fetched per card, not paged".to_string(),
            )),
        }
    }

    async fn fetch_single(&self, entity: EntityType, id: &str) -> Result<ApiResponse<RawItem>> {
        let path = match entity {
            EntityType::CardCreateAction => {
                let query = [("filter", "createCard".to_string())];
                let response =
                    into_items(self.get(&format!("/cards/{}/actions", id), &query).await?)?;
                return Ok(match response.data {
                    Some(actions) if response.status.is_success() => {
                        match actions.into_iter().next() {
                            Some(action) => ApiResponse::ok(action),
                            None => ApiResponse::status(
                                StatusCode::NOT_FOUND,
                                format!("No createCard action for card {}", id),
                            ),
                        }
                    }
                    _ => ApiResponse {
                        status: response.status,
                        retry_after: response.retry_after,
                        data: None,
                        message: response.message,
                    },
                });
            }
            EntityType::Users => format!("/members/{}", id),
            EntityType::Cards => format!("/cards/{}", id),
            EntityType::Labels => format!("/labels/{}", id),
            EntityType::Lists => format!("/lists/{}", id),
            EntityType::Boards => format!("/boards/{}", id),
            EntityType::Attachments => {
                return Err(SyncError::Config(
                    "attachments are only reachable through their card".to_string(),
                ))
            }
        };
        self.get(&path, &[]).await
    }
}
