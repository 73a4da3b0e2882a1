use std::sync::Arc;

use sqlx::SqlitePool;

use crate::{config::AppConfig, db, foods::FoodStorage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub foods: FoodStorage,
}

impl AppState {
    /// Open the database, apply migrations and wire up the storage service.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = db::connect(&config.database).await?;
        db::migrate(&db).await?;
        Ok(Self::from_parts(db, Arc::new(config)))
    }

    pub fn from_parts(db: SqlitePool, config: Arc<AppConfig>) -> Self {
        Self {
            config,
            foods: FoodStorage::new(db),
        }
    }
}
