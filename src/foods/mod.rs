pub mod dto;
pub mod handlers;
pub mod payload;
pub mod repo;
pub mod repo_types;
mod services;
pub mod view;

pub use services::FoodStorage;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::read_routes())
        .merge(handlers::write_routes())
}
