//! Route handlers of the read API

use crate::api::error::ApiError;
use crate::api::AppState;
use crate::crawler::CrawlReport;
use crate::storage::{
    ChangeEntry, ItemQuery, ItemStore, SortField, SortOrder, SqliteStorage, StorageResult,
    StoredItem,
};
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MAX_PAGE_SIZE: u32 = 200;
pub const DEFAULT_CHANGES_LIMIT: u32 = 50;
pub const MAX_CHANGES_LIMIT: u32 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub rating: Option<u8>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl ListParams {
    /// Validates the parameters and turns them into a storage query
    pub fn into_query(self) -> Result<ItemQuery, ApiError> {
        let defaults = ItemQuery::default();

        let sort = match self.sort_by.as_deref() {
            Some(s) => SortField::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown sort_by value '{}'", s)))?,
            None => defaults.sort,
        };
        let order = match self.order.as_deref() {
            Some(s) => SortOrder::parse(s)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown order value '{}'", s)))?,
            None => sort.default_order(),
        };

        let page = self.page.unwrap_or(defaults.page);
        if page < 1 {
            return Err(ApiError::BadRequest("page must be at least 1".to_string()));
        }
        let page_size = self.page_size.unwrap_or(defaults.page_size);
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(ApiError::BadRequest(format!(
                "page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if let Some(rating) = self.rating {
            if rating > 5 {
                return Err(ApiError::BadRequest(
                    "rating must be between 0 and 5".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(ApiError::BadRequest(
                    "min_price must not exceed max_price".to_string(),
                ));
            }
        }

        Ok(ItemQuery {
            category: self.category.filter(|c| !c.is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
            rating: self.rating,
            sort,
            order,
            page,
            page_size,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse {
    pub items: Vec<StoredItem>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub source_url: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangesParams {
    pub limit: Option<u32>,
}

/// Runs a storage closure on the blocking pool under the storage lock
async fn with_storage<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStorage) -> StorageResult<T> + Send + 'static,
{
    let storage = Arc::clone(&state.storage);
    let result = tokio::task::spawn_blocking(move || {
        let guard = storage
            .lock()
            .map_err(|_| crate::storage::StorageError::LockPoisoned)?;
        f(&*guard)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("storage task failed: {}", e)))?;

    Ok(result?)
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn bad_path(rejection: PathRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

/// `GET /items`
pub async fn list_items(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ItemsResponse>, ApiError> {
    let Query(params) = params.map_err(bad_query)?;
    let query = params.into_query()?;
    let (page, page_size) = (query.page, query.page_size);

    let result = with_storage(&state, move |storage| storage.list_items(&query)).await?;

    Ok(Json(ItemsResponse {
        items: result.items,
        page,
        page_size,
        total: result.total,
    }))
}

/// `GET /items/:id`
pub async fn get_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<StoredItem>, ApiError> {
    let Path(id) = id.map_err(bad_path)?;
    with_storage(&state, move |storage| storage.get_item(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Item {} not found", id)))
}

/// `GET /items/lookup?source_url=...`
pub async fn lookup_item(
    State(state): State<AppState>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> Result<Json<StoredItem>, ApiError> {
    let Query(LookupParams { source_url }) = params.map_err(bad_query)?;
    let url = source_url.clone();
    with_storage(&state, move |storage| storage.get_item_by_url(&url))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No item with source_url {}", source_url)))
}

/// `GET /items/:id/changes`
pub async fn item_changes(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Vec<ChangeEntry>>, ApiError> {
    let Path(id) = id.map_err(bad_path)?;
    let changes = with_storage(&state, move |storage| {
        if storage.get_item(id)?.is_none() {
            return Err(crate::storage::StorageError::ItemNotFound(id));
        }
        storage.changes_for_item(id)
    })
    .await?;
    Ok(Json(changes))
}

/// `GET /changes?limit=N`
pub async fn recent_changes(
    State(state): State<AppState>,
    params: Result<Query<ChangesParams>, QueryRejection>,
) -> Result<Json<Vec<ChangeEntry>>, ApiError> {
    let Query(params) = params.map_err(bad_query)?;
    let limit = params.limit.unwrap_or(DEFAULT_CHANGES_LIMIT);
    if limit == 0 {
        return Err(ApiError::BadRequest("limit must be at least 1".to_string()));
    }
    let limit = limit.min(MAX_CHANGES_LIMIT);

    let changes = with_storage(&state, move |storage| storage.recent_changes(limit)).await?;
    Ok(Json(changes))
}

/// `POST /crawl`
///
/// Waits for a running crawl to finish, then runs one of its own.
pub async fn trigger_crawl(State(state): State<AppState>) -> Json<CrawlReport> {
    if state.coordinator.is_running() {
        tracing::info!("Crawl requested while another run is active, waiting");
    }
    let report = state.coordinator.run(&state.start_url).await;
    Json(report)
}
