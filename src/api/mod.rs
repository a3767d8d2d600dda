use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{get, post};
use axum::{Router, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::filter::ItemFilter;
use crate::models::*;
use crate::state::AppState;

#[derive(Deserialize)]
struct ItemQueryParams {
    filter: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub filter: ItemFilter,
    pub label: String,
    pub empty_message: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearCompletedResponse {
    pub cleared: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/items", get(list_items).post(create_item).delete(delete_all_items))
        .route("/items/clear-completed", post(clear_completed))
        .route("/items/{id}", get(get_item).patch(update_item).delete(delete_item))
        .route("/items/{id}/complete", post(complete_item))
        .route("/items/{id}/activate", post(activate_item))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    sqlx::query("select 1").execute(&state.db).await?;
    Ok(StatusCode::OK)
}

async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<ItemQueryParams>
) -> Result<Json<ItemListResponse>, AppError> {
    let filter = match params.filter.as_deref() {
        Some(raw) => raw.parse::<ItemFilter>()?,
        None => ItemFilter::default(),
    };
    let items = state.todos.list_items(filter).await?;
    Ok(Json(ItemListResponse {
        filter,
        label: filter.label().to_string(),
        empty_message: filter.empty_message().to_string(),
        items,
    }))
}

async fn create_item(
    State(state): State<AppState>,
    Json(req): Json<NewItemRequest>
) -> Result<(StatusCode, Json<Item>), AppError> {
    let item = state.todos.create_item(req).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Item>, AppError> {
    let item = state.todos.get_item(&id).await?;
    Ok(Json(item))
}

async fn update_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>
) -> Result<Json<Item>, AppError> {
    let item = state.todos.update_item(&id, req).await?;
    Ok(Json(item))
}

async fn complete_item(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Item>, AppError> {
    let item = state.todos.complete_item(&id).await?;
    Ok(Json(item))
}

async fn activate_item(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<Json<Item>, AppError> {
    let item = state.todos.activate_item(&id).await?;
    Ok(Json(item))
}

async fn delete_item(
    State(state): State<AppState>,
    Path(id): Path<String>
) -> Result<StatusCode, AppError> {
    state.todos.delete_item(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_all_items(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.todos.delete_all().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_completed(State(state): State<AppState>) -> Json<ClearCompletedResponse> {
    let cleared = state.todos.clear_completed().await;
    Json(ClearCompletedResponse { cleared })
}
