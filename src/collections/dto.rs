use serde::{Deserialize, Serialize};

use super::repo_types::CollectionRow;
use crate::foods::view::FoodView;

pub const DEFAULT_COLOR: &str = "#007aff";

#[derive(Debug, Deserialize)]
pub struct CreateCollection {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddFood {
    pub food_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MembershipOutcome {
    pub message: String,
    pub already_member: bool,
}

#[derive(Debug, Serialize)]
pub struct CollectionList {
    pub collections: Vec<CollectionRow>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CollectionFoods {
    pub collection: CollectionRow,
    pub foods: Vec<FoodView>,
    pub count: usize,
}
