use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::view::FoodView;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, MAX_LIMIT)
}

pub fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

#[derive(Debug, Serialize)]
pub struct IngestOutcome {
    pub message: String,
    pub food: FoodView,
    pub duplicate: bool,
}

#[derive(Debug, Serialize)]
pub struct UpdateOutcome {
    pub message: String,
    pub updated_fields: Vec<String>,
    pub food: FoodView,
}

#[derive(Debug, Serialize)]
pub struct DeleteOutcome {
    pub message: String,
}

/// Dashboard counters. `error` is set (and the counters zeroed) when the
/// aggregates could not be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FoodStats {
    pub total_foods: i64,
    pub unique_brands: i64,
    pub data_types: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_saved: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub component: &'static str,
    pub database_connected: bool,
    pub foods_stored: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[derive(Debug, Deserialize)]
pub struct FoodListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    pub search: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Serialize)]
pub struct FoodList {
    pub foods: Vec<FoodView>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FoodList {
    pub fn new(foods: Vec<FoodView>) -> Self {
        Self {
            count: foods.len(),
            foods,
            query: None,
            category: None,
        }
    }
}
