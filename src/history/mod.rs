pub mod handlers;
mod repo;

#[cfg(test)]
pub use repo::count_actions;
pub use repo::{list_recent, record, HistoryAction, HistoryEntry, NewHistoryEntry};

use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new().route("/history", get(handlers::recent_history))
}
