use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use tracing::instrument;

use super::dto::{AddFood, CollectionFoods, CollectionList, CreateCollection, MembershipOutcome};
use super::repo_types::CollectionRow;
use crate::{
    error::StoreError,
    foods::dto::{DeleteOutcome, LimitQuery},
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/collections", get(list_collections).post(create_collection))
        .route("/collections/:id", delete(delete_collection))
        .route(
            "/collections/:id/foods",
            get(collection_foods).post(add_to_collection),
        )
        .route(
            "/collections/:id/foods/:food_id",
            delete(remove_from_collection),
        )
}

#[instrument(skip(state))]
pub async fn list_collections(
    State(state): State<AppState>,
) -> Result<Json<CollectionList>, StoreError> {
    let collections = state.foods.list_collections().await?;
    Ok(Json(CollectionList {
        count: collections.len(),
        collections,
    }))
}

#[instrument(skip(state, body))]
pub async fn create_collection(
    State(state): State<AppState>,
    body: Result<Json<CreateCollection>, JsonRejection>,
) -> Result<(StatusCode, Json<CollectionRow>), StoreError> {
    let Json(body) = body.map_err(|_| StoreError::validation("Collection name is required"))?;
    let collection = state
        .foods
        .create_collection(&body.name, body.description.as_deref(), body.color.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

#[instrument(skip(state))]
pub async fn delete_collection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteOutcome>, StoreError> {
    Ok(Json(state.foods.delete_collection(id).await?))
}

#[instrument(skip(state))]
pub async fn collection_foods(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<CollectionFoods>, StoreError> {
    let Query(q) = query?;
    Ok(Json(state.foods.collection_foods(id, q.limit).await?))
}

/// 201 when the food was added, 200 when it was already a member.
#[instrument(skip(state, body))]
pub async fn add_to_collection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<AddFood>, JsonRejection>,
) -> Result<(StatusCode, Json<MembershipOutcome>), StoreError> {
    let Json(body) = body.map_err(|_| StoreError::validation("food_id is required"))?;
    let outcome = state.foods.add_to_collection(id, body.food_id).await?;
    let status = if outcome.already_member {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

#[instrument(skip(state))]
pub async fn remove_from_collection(
    State(state): State<AppState>,
    Path((id, food_id)): Path<(i64, i64)>,
) -> Result<Json<DeleteOutcome>, StoreError> {
    Ok(Json(state.foods.remove_from_collection(id, food_id).await?))
}
