//! In-memory source for tests
//!
//! Serves fixed collections with the same backward paging as the real API and
//! lets a test script individual responses (429, 500, ...) per entity.

use super::{page_before, ApiResponse, EntityType, RawItem, SourceClient};
use crate::config::PageSize;
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A recorded `fetch_page` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCall {
    pub entity: EntityType,
    pub parent_id: String,
    pub cursor: Option<String>,
    pub limit: u32,
}

#[derive(Default)]
pub struct MemorySource {
    collections: Mutex<HashMap<EntityType, Vec<RawItem>>>,
    singles: Mutex<HashMap<(EntityType, String), RawItem>>,
    scripted_pages: Mutex<HashMap<EntityType, VecDeque<ApiResponse<Vec<RawItem>>>>>,
    scripted_singles: Mutex<HashMap<EntityType, VecDeque<ApiResponse<RawItem>>>>,
    page_calls: Mutex<Vec<PageCall>>,
    single_calls: Mutex<Vec<(EntityType, String)>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(self, entity: EntityType, items: Vec<RawItem>) -> Self {
        self.set_items(entity, items);
        self
    }

    pub fn with_single(self, entity: EntityType, id: impl Into<String>, item: RawItem) -> Self {
        lock(&self.singles).insert((entity, id.into()), item);
        self
    }

    /// Replace a collection, e.g. between two runs
    pub fn set_items(&self, entity: EntityType, items: Vec<RawItem>) {
        lock(&self.collections).insert(entity, items);
    }

    /// Answer the next page request for `entity` with `response`
    pub fn respond_next(&self, entity: EntityType, response: ApiResponse<Vec<RawItem>>) {
        lock(&self.scripted_pages)
            .entry(entity)
            .or_default()
            .push_back(response);
    }

    /// Answer the next single lookup for `entity` with `response`
    pub fn respond_next_single(&self, entity: EntityType, response: ApiResponse<RawItem>) {
        lock(&self.scripted_singles)
            .entry(entity)
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self) -> Vec<PageCall> {
        lock(&self.page_calls).clone()
    }

    pub fn calls_for(&self, entity: EntityType) -> Vec<PageCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.entity == entity)
            .collect()
    }

    pub fn single_calls(&self) -> Vec<(EntityType, String)> {
        lock(&self.single_calls).clone()
    }
}

#[async_trait]
impl SourceClient for MemorySource {
    async fn fetch_page(
        &self,
        entity: EntityType,
        parent_id: &str,
        cursor: Option<&str>,
        limit: PageSize,
    ) -> Result<ApiResponse<Vec<RawItem>>> {
        lock(&self.page_calls).push(PageCall {
            entity,
            parent_id: parent_id.to_string(),
            cursor: cursor.map(String::from),
            limit: limit.get(),
        });

        if let Some(response) = lock(&self.scripted_pages)
            .get_mut(&entity)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }

        let items = lock(&self.collections)
            .get(&entity)
            .cloned()
            .unwrap_or_default();
        Ok(ApiResponse::ok(page_before(items, cursor, limit)))
    }

    async fn fetch_single(&self, entity: EntityType, id: &str) -> Result<ApiResponse<RawItem>> {
        lock(&self.single_calls).push((entity, id.to_string()));

        if let Some(response) = lock(&self.scripted_singles)
            .get_mut(&entity)
            .and_then(VecDeque::pop_front)
        {
            return Ok(response);
        }

        Ok(match lock(&self.singles).get(&(entity, id.to_string())) {
            Some(item) => ApiResponse::ok(item.clone()),
            None => ApiResponse::status(StatusCode::NOT_FOUND, format!("{} not found", id)),
        })
    }
}
