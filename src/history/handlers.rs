use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use serde::Serialize;
use tracing::instrument;

use super::HistoryEntry;
use crate::{error::StoreError, foods::dto::LimitQuery, state::AppState};

#[derive(Debug, Serialize)]
pub struct HistoryList {
    pub history: Vec<HistoryEntry>,
    pub count: usize,
}

/// GET /history?limit
#[instrument(skip(state))]
pub async fn recent_history(
    State(state): State<AppState>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> Result<Json<HistoryList>, StoreError> {
    let Query(q) = query?;
    let history = state.foods.recent_history(q.limit).await?;
    Ok(Json(HistoryList {
        count: history.len(),
        history,
    }))
}
