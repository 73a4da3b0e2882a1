use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tracing::instrument;

use super::dto::{
    DeleteOutcome, FoodList, FoodListQuery, FoodStats, HealthReport, IngestOutcome, LimitQuery,
    SearchQuery, UpdateOutcome,
};
use super::view::{FoodView, NutrientSummary};
use crate::{error::StoreError, extractors::ClientAddr, state::AppState};

// --- routers ---

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/foods", get(list_foods))
        .route("/foods/:id", get(get_food))
        .route("/foods/:id/summary", get(food_summary))
        .route("/foods/:id/raw", get(raw_food))
        .route("/foods/fdc/:fdc_id", get(get_food_by_fdc))
        .route("/search", get(search_foods))
        .route("/categories/:category", get(foods_by_category))
        .route("/stats", get(stats))
        .route("/health", get(health))
        .route("/nutrients", get(list_nutrients))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/foods", post(save_food))
        .route("/foods/:id", put(update_food).delete(delete_food))
}

// --- handlers ---

/// GET /foods?search=…|category=…|limit&offset
#[instrument(skip(state))]
pub async fn list_foods(
    State(state): State<AppState>,
    ClientAddr(origin): ClientAddr,
    query: Result<Query<FoodListQuery>, QueryRejection>,
) -> Result<Json<FoodList>, StoreError> {
    let Query(q) = query?;
    let search = q.search.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let category = q.category.as_deref().filter(|c| !c.is_empty());

    let list = if let Some(search) = search {
        let foods = state.foods.search(search, q.limit, origin.as_deref()).await?;
        FoodList {
            query: Some(search.to_string()),
            ..FoodList::new(foods)
        }
    } else if let Some(category) = category {
        let foods = state.foods.list_by_category(category, q.limit).await?;
        FoodList {
            category: Some(category.to_string()),
            ..FoodList::new(foods)
        }
    } else {
        FoodList::new(state.foods.list_all(q.limit, q.offset).await?)
    };
    Ok(Json(list))
}

/// POST /foods: 201 for a new food, 200 when it was already stored.
#[instrument(skip(state, body))]
pub async fn save_food(
    State(state): State<AppState>,
    ClientAddr(origin): ClientAddr,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestOutcome>), StoreError> {
    let Json(payload) = body.map_err(|_| StoreError::validation("No food data provided"))?;

    let outcome = state.foods.ingest(&payload, origin.as_deref()).await?;
    let status = if outcome.duplicate {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

#[instrument(skip(state))]
pub async fn get_food(
    State(state): State<AppState>,
    ClientAddr(origin): ClientAddr,
    Path(id): Path<i64>,
) -> Result<Json<FoodView>, StoreError> {
    let food = state
        .foods
        .get_by_internal_id(id)
        .await?
        .ok_or_else(|| StoreError::not_found("Food not found"))?;
    state.foods.record_view(id, origin.as_deref()).await;
    Ok(Json(food))
}

#[instrument(skip(state))]
pub async fn get_food_by_fdc(
    State(state): State<AppState>,
    Path(fdc_id): Path<i64>,
) -> Result<Json<FoodView>, StoreError> {
    state
        .foods
        .get_by_external_id(fdc_id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::not_found("Food not found"))
}

#[instrument(skip(state))]
pub async fn food_summary(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<NutrientSummary>, StoreError> {
    state
        .foods
        .nutrient_summary(id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::not_found("Food not found"))
}

#[instrument(skip(state))]
pub async fn raw_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, StoreError> {
    state
        .foods
        .raw_payload(id)
        .await?
        .map(Json)
        .ok_or_else(|| StoreError::not_found("Food not found"))
}

#[instrument(skip(state, body))]
pub async fn update_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<Json<UpdateOutcome>, StoreError> {
    let Json(fields) = body.map_err(|_| StoreError::validation("No update data provided"))?;
    Ok(Json(state.foods.update(id, &fields).await?))
}

#[instrument(skip(state))]
pub async fn delete_food(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteOutcome>, StoreError> {
    Ok(Json(state.foods.delete(id).await?))
}

/// GET /search?q=…: an empty query lists recent foods.
#[instrument(skip(state))]
pub async fn search_foods(
    State(state): State<AppState>,
    ClientAddr(origin): ClientAddr,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<FoodList>, StoreError> {
    let Query(q) = query?;
    let foods = state.foods.search(&q.q, q.limit, origin.as_deref()).await?;
    Ok(Json(FoodList {
        query: Some(q.q),
        ..FoodList::new(foods)
    }))
}

#[instrument(skip(state))]
pub async fn foods_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<FoodList>, StoreError> {
    let Query(q) = query?;
    let foods = state.foods.list_by_category(&category, q.limit).await?;
    Ok(Json(FoodList {
        category: Some(category),
        ..FoodList::new(foods)
    }))
}

#[instrument(skip(state))]
pub async fn stats(State(state): State<AppState>) -> Json<FoodStats> {
    Json(state.foods.stats().await)
}

#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.foods.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

#[instrument(skip(state))]
pub async fn list_nutrients(State(state): State<AppState>) -> Result<Json<Value>, StoreError> {
    let nutrients = state.foods.list_nutrients().await?;
    Ok(Json(json!({
        "count": nutrients.len(),
        "nutrients": nutrients,
    })))
}
