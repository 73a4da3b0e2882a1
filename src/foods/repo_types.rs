use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

/// `foods` row without the raw payload column.
#[derive(Debug, Clone, FromRow)]
pub struct FoodRow {
    pub id: i64,
    pub fdc_id: i64,
    pub description: String,
    pub brand_owner: Option<String>,
    pub brand_name: Option<String>,
    pub subbrand_name: Option<String>,
    pub data_type: String,
    pub food_category: Option<String>,
    pub food_category_id: Option<i64>,
    pub published_date: Option<Date>,
    pub modified_date: Option<Date>,
    pub available_date: Option<Date>,
    pub ingredients: Option<String>,
    pub market_country: Option<String>,
    pub serving_size: Option<f64>,
    pub serving_size_unit: Option<String>,
    pub household_serving_fulltext: Option<String>,
    pub saved_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// `food_nutrients` joined with its reference row (left join, so the
/// nutrient columns are optional).
#[derive(Debug, Clone, FromRow)]
pub struct FoodNutrientRow {
    pub food_id: i64,
    pub nutrient_id: i64,
    pub amount: f64,
    pub data_points: Option<i64>,
    pub derivation_id: Option<i64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub median_value: Option<f64>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i64>,
    pub nutrient_name: Option<String>,
    pub nutrient_unit: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct FoodPortionRow {
    pub id: i64,
    pub food_id: i64,
    pub seq_num: Option<i64>,
    pub amount: f64,
    pub measure_unit_id: Option<i64>,
    pub measure_unit_name: Option<String>,
    pub measure_unit_abbreviation: Option<String>,
    pub modifier: Option<String>,
    pub gram_weight: f64,
    pub data_points: Option<i64>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NutrientRow {
    pub id: i64,
    pub name: String,
    pub unit_name: String,
    pub nutrient_nbr: Option<f64>,
    pub rank: Option<i64>,
}
