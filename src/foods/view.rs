//! Canonical food representation.
//!
//! Several keys are emitted twice (or three times) under different spellings.
//! The upstream aggregator and its templates read the camelCase provider
//! names while newer callers read snake_case, and both must keep working.

use serde::{ser::SerializeMap, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

use super::repo_types::{FoodNutrientRow, FoodPortionRow, FoodRow};

pub const ENERGY_KCAL: i64 = 1008;
pub const PROTEIN: i64 = 1003;
pub const TOTAL_FAT: i64 = 1004;
pub const CARBOHYDRATE: i64 = 1005;
pub const SODIUM: i64 = 1093;

#[derive(Debug, Clone, PartialEq)]
pub struct FoodView {
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
    pub nutrients: Vec<NutrientView>,
    pub portions: Vec<PortionView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NutrientView {
    pub nutrient_id: i64,
    pub amount: f64,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub data_points: Option<i64>,
    pub derivation_id: Option<i64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub median_value: Option<f64>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortionView {
    pub id: i64,
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

impl FoodView {
    pub fn from_parts(
        row: FoodRow,
        nutrients: Vec<FoodNutrientRow>,
        portions: Vec<FoodPortionRow>,
    ) -> Self {
        Self {
            id: row.id,
            fdc_id: row.fdc_id,
            description: row.description,
            brand_owner: row.brand_owner,
            brand_name: row.brand_name,
            subbrand_name: row.subbrand_name,
            data_type: row.data_type,
            food_category: row.food_category,
            food_category_id: row.food_category_id,
            published_date: row.published_date,
            modified_date: row.modified_date,
            available_date: row.available_date,
            ingredients: row.ingredients,
            market_country: row.market_country,
            serving_size: row.serving_size,
            serving_size_unit: row.serving_size_unit,
            household_serving_fulltext: row.household_serving_fulltext,
            saved_at: row.saved_at,
            updated_at: row.updated_at,
            nutrients: nutrients.into_iter().map(NutrientView::from).collect(),
            portions: portions.into_iter().map(PortionView::from).collect(),
        }
    }

    pub fn nutrient_amount(&self, nutrient_id: i64) -> Option<f64> {
        self.nutrients
            .iter()
            .find(|n| n.nutrient_id == nutrient_id)
            .map(|n| n.amount)
    }

    pub fn summary(&self) -> NutrientSummary {
        NutrientSummary {
            id: self.id,
            fdc_id: self.fdc_id,
            description: self.description.clone(),
            calories: self.nutrient_amount(ENERGY_KCAL),
            protein: self.nutrient_amount(PROTEIN),
            fat: self.nutrient_amount(TOTAL_FAT),
            carbs: self.nutrient_amount(CARBOHYDRATE),
            sodium: self.nutrient_amount(SODIUM),
        }
    }
}

impl From<FoodNutrientRow> for NutrientView {
    fn from(r: FoodNutrientRow) -> Self {
        Self {
            nutrient_id: r.nutrient_id,
            amount: r.amount,
            name: r.nutrient_name,
            unit: r.nutrient_unit,
            data_points: r.data_points,
            derivation_id: r.derivation_id,
            min_value: r.min_value,
            max_value: r.max_value,
            median_value: r.median_value,
            footnote: r.footnote,
            min_year_acquired: r.min_year_acquired,
        }
    }
}

impl From<FoodPortionRow> for PortionView {
    fn from(r: FoodPortionRow) -> Self {
        Self {
            id: r.id,
            seq_num: r.seq_num,
            amount: r.amount,
            measure_unit_id: r.measure_unit_id,
            measure_unit_name: r.measure_unit_name,
            measure_unit_abbreviation: r.measure_unit_abbreviation,
            modifier: r.modifier,
            gram_weight: r.gram_weight,
            data_points: r.data_points,
            footnote: r.footnote,
            min_year_acquired: r.min_year_acquired,
        }
    }
}

/// Energy (kcal) and macronutrients per 100 g.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutrientSummary {
    pub id: i64,
    pub fdc_id: i64,
    pub description: String,
    pub calories: Option<f64>,
    pub protein: Option<f64>,
    pub fat: Option<f64>,
    pub carbs: Option<f64>,
    pub sodium: Option<f64>,
}

fn iso_date(d: Option<Date>) -> Option<String> {
    d.map(|d| d.to_string())
}

fn rfc3339<E: serde::ser::Error>(ts: OffsetDateTime) -> Result<String, E> {
    ts.format(&Rfc3339).map_err(E::custom)
}

impl Serialize for FoodView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let published = iso_date(self.published_date);
        let mut m = serializer.serialize_map(None)?;
        m.serialize_entry("id", &self.id)?;
        m.serialize_entry("fdc_id", &self.fdc_id)?;
        m.serialize_entry("fdcId", &self.fdc_id)?;
        m.serialize_entry("description", &self.description)?;
        m.serialize_entry("name", &self.description)?;
        m.serialize_entry("brand_owner", &self.brand_owner)?;
        m.serialize_entry("brandOwner", &self.brand_owner)?;
        m.serialize_entry("brand", &self.brand_owner)?;
        m.serialize_entry("brand_name", &self.brand_name)?;
        m.serialize_entry("subbrand_name", &self.subbrand_name)?;
        m.serialize_entry("data_type", &self.data_type)?;
        m.serialize_entry("dataType", &self.data_type)?;
        m.serialize_entry("food_category", &self.food_category)?;
        m.serialize_entry("food_category_id", &self.food_category_id)?;
        m.serialize_entry("published_date", &published)?;
        m.serialize_entry("publishedDate", &published)?;
        m.serialize_entry("modified_date", &iso_date(self.modified_date))?;
        m.serialize_entry("available_date", &iso_date(self.available_date))?;
        m.serialize_entry("ingredients", &self.ingredients)?;
        m.serialize_entry("market_country", &self.market_country)?;
        m.serialize_entry("serving_size", &self.serving_size)?;
        m.serialize_entry("serving_unit", &self.serving_size_unit)?;
        m.serialize_entry("household_serving_fulltext", &self.household_serving_fulltext)?;
        m.serialize_entry("saved_at", &rfc3339::<S::Error>(self.saved_at)?)?;
        m.serialize_entry("updated_at", &rfc3339::<S::Error>(self.updated_at)?)?;
        m.serialize_entry("nutrients", &self.nutrients)?;
        m.serialize_entry("portions", &self.portions)?;
        m.end()
    }
}

#[derive(Serialize)]
struct NutrientRef<'a> {
    id: i64,
    name: &'a Option<String>,
    #[serde(rename = "unitName")]
    unit_name: &'a Option<String>,
}

impl Serialize for NutrientView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut m = serializer.serialize_map(None)?;
        m.serialize_entry("nutrient_id", &self.nutrient_id)?;
        m.serialize_entry("nutrientId", &self.nutrient_id)?;
        m.serialize_entry("amount", &self.amount)?;
        m.serialize_entry("value", &self.amount)?;
        m.serialize_entry("unit", &self.unit)?;
        m.serialize_entry("name", &self.name)?;
        m.serialize_entry("data_points", &self.data_points)?;
        m.serialize_entry("derivation_id", &self.derivation_id)?;
        m.serialize_entry("min_value", &self.min_value)?;
        m.serialize_entry("max_value", &self.max_value)?;
        m.serialize_entry("median_value", &self.median_value)?;
        m.serialize_entry("footnote", &self.footnote)?;
        m.serialize_entry("min_year_acquired", &self.min_year_acquired)?;
        m.serialize_entry(
            "nutrient",
            &NutrientRef {
                id: self.nutrient_id,
                name: &self.name,
                unit_name: &self.unit,
            },
        )?;
        m.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::{date, datetime};

    fn sample() -> FoodView {
        FoodView {
            id: 1,
            fdc_id: 173944,
            description: "Apples, raw".into(),
            brand_owner: Some("Orchard Co".into()),
            brand_name: None,
            subbrand_name: None,
            data_type: "SR Legacy".into(),
            food_category: Some("Fruits and Fruit Juices".into()),
            food_category_id: Some(9),
            published_date: Some(date!(2019 - 04 - 01)),
            modified_date: None,
            available_date: None,
            ingredients: None,
            market_country: None,
            serving_size: None,
            serving_size_unit: None,
            household_serving_fulltext: None,
            saved_at: datetime!(2024-05-01 12:00:00 UTC),
            updated_at: datetime!(2024-05-01 12:00:00 UTC),
            nutrients: vec![NutrientView {
                nutrient_id: ENERGY_KCAL,
                amount: 52.0,
                name: Some("Energy".into()),
                unit: Some("kcal".into()),
                data_points: None,
                derivation_id: None,
                min_value: None,
                max_value: None,
                median_value: None,
                footnote: None,
                min_year_acquired: None,
            }],
            portions: vec![],
        }
    }

    #[test]
    fn aliases_carry_the_same_values() {
        let v = serde_json::to_value(sample()).unwrap();
        assert_eq!(v["fdc_id"], 173944);
        assert_eq!(v["fdcId"], 173944);
        assert_eq!(v["description"], v["name"]);
        assert_eq!(v["brand_owner"], "Orchard Co");
        assert_eq!(v["brandOwner"], "Orchard Co");
        assert_eq!(v["brand"], "Orchard Co");
        assert_eq!(v["data_type"], v["dataType"]);
        assert_eq!(v["published_date"], "2019-04-01");
        assert_eq!(v["publishedDate"], "2019-04-01");
        assert_eq!(v["saved_at"], "2024-05-01T12:00:00Z");
        assert_eq!(v["serving_unit"], serde_json::Value::Null);
    }

    #[test]
    fn nutrient_shape() {
        let v = serde_json::to_value(sample()).unwrap();
        let n = &v["nutrients"][0];
        assert_eq!(n["nutrient_id"], 1008);
        assert_eq!(n["nutrientId"], 1008);
        assert_eq!(n["amount"], 52.0);
        assert_eq!(n["value"], 52.0);
        assert_eq!(
            n["nutrient"],
            json!({"id": 1008, "name": "Energy", "unitName": "kcal"})
        );
    }

    #[test]
    fn summary_picks_known_nutrients() {
        let s = sample().summary();
        assert_eq!(s.calories, Some(52.0));
        assert_eq!(s.protein, None);
    }
}
