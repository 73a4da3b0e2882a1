//! Field resolution for provider payloads.
//!
//! Upstream payloads are loosely shaped: the aggregator forwards either the
//! provider's camelCase document or its own snake_case reshaping of it. Every
//! canonical field therefore has an ordered list of candidate keys; the first
//! key holding a usable (non-null, non-empty) value wins. Resolution produces
//! a [`FoodDraft`] that the storage layer persists as-is.

use serde_json::{Map, Value};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime,
};

use crate::error::StoreError;

pub const UNKNOWN_DESCRIPTION: &str = "Unknown Food";
pub const UNKNOWN_DATA_TYPE: &str = "Unknown";
pub const DEFAULT_PORTION_AMOUNT: f64 = 1.0;
pub const DEFAULT_GRAM_WEIGHT: f64 = 100.0;

const FDC_ID: &[&str] = &["fdcId", "food_id"];
const DESCRIPTION: &[&str] = &["description", "name"];
const BRAND_OWNER: &[&str] = &["brandOwner", "brand_owner", "brand"];
const BRAND_NAME: &[&str] = &["brandName", "brand_name"];
const SUBBRAND_NAME: &[&str] = &["subbrandName", "subbrand_name"];
const DATA_TYPE: &[&str] = &["dataType", "data_type"];
const FOOD_CATEGORY: &[&str] = &["foodCategory", "food_category"];
const FOOD_CATEGORY_ID: &[&str] = &["foodCategoryId"];
const PUBLISHED_DATE: &[&str] = &["publishedDate", "publicationDate"];
const MODIFIED_DATE: &[&str] = &["modifiedDate"];
const AVAILABLE_DATE: &[&str] = &["availableDate"];
const INGREDIENTS: &[&str] = &["ingredients"];
const MARKET_COUNTRY: &[&str] = &["marketCountry", "market_country"];
const SERVING_SIZE: &[&str] = &["serving_size", "servingSize"];
const SERVING_SIZE_UNIT: &[&str] = &["serving_unit", "servingSizeUnit"];
const HOUSEHOLD_SERVING: &[&str] = &["householdServingFullText"];

const NUTRIENTS: &str = "foodNutrients";
const PORTIONS: &str = "foodPortions";

/// A food payload resolved into canonical, typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodDraft {
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
    pub nutrients: Vec<NutrientDraft>,
    pub portions: Vec<PortionDraft>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NutrientDraft {
    pub nutrient_id: i64,
    pub amount: f64,
    pub name: Option<String>,
    pub unit_name: Option<String>,
    pub number: Option<f64>,
    pub rank: Option<i64>,
    pub data_points: Option<i64>,
    pub derivation_id: Option<i64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub median_value: Option<f64>,
    pub footnote: Option<String>,
    pub min_year_acquired: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortionDraft {
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

impl FoodDraft {
    /// Resolve a raw payload. Only a missing or malformed external id is an
    /// error; everything else degrades to a default or to absent.
    pub fn resolve(payload: &Value) -> Result<Self, StoreError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| StoreError::validation("Food data must be a JSON object"))?;

        let fdc_id = resolve_fdc_id(obj)?;

        let (food_category, food_category_id) = resolve_category(obj);

        Ok(Self {
            fdc_id,
            description: text(obj, DESCRIPTION).unwrap_or_else(|| UNKNOWN_DESCRIPTION.to_string()),
            brand_owner: text(obj, BRAND_OWNER),
            brand_name: text(obj, BRAND_NAME),
            subbrand_name: text(obj, SUBBRAND_NAME),
            data_type: text(obj, DATA_TYPE).unwrap_or_else(|| UNKNOWN_DATA_TYPE.to_string()),
            food_category,
            food_category_id,
            published_date: date(obj, PUBLISHED_DATE),
            modified_date: date(obj, MODIFIED_DATE),
            available_date: date(obj, AVAILABLE_DATE),
            ingredients: text(obj, INGREDIENTS),
            market_country: text(obj, MARKET_COUNTRY),
            serving_size: first(obj, SERVING_SIZE).and_then(as_number),
            serving_size_unit: text(obj, SERVING_SIZE_UNIT),
            household_serving_fulltext: text(obj, HOUSEHOLD_SERVING),
            nutrients: resolve_nutrients(obj),
            portions: entries(obj, PORTIONS)
                .filter_map(PortionDraft::resolve)
                .collect(),
        })
    }
}

impl NutrientDraft {
    /// `None` when the entry lacks a nutrient id or a numeric amount.
    pub fn resolve(entry: &Value) -> Option<Self> {
        let obj = entry.as_object()?;
        let info = obj.get("nutrient").and_then(Value::as_object);

        let nutrient_id = info
            .and_then(|n| n.get("id"))
            .and_then(as_positive_id)
            .or_else(|| obj.get("nutrientId").and_then(as_positive_id))?;
        let amount = first(obj, &["amount", "value"]).and_then(as_number)?;

        Some(Self {
            nutrient_id,
            amount,
            name: info
                .and_then(|n| text(n, &["name"]))
                .or_else(|| text(obj, &["nutrientName"])),
            unit_name: info
                .and_then(|n| text(n, &["unitName"]))
                .or_else(|| text(obj, &["unitName"])),
            number: info
                .and_then(|n| first(n, &["number"]))
                .or_else(|| first(obj, &["nutrientNumber"]))
                .and_then(as_number),
            rank: info.and_then(|n| first(n, &["rank"])).and_then(as_integer),
            data_points: first(obj, &["dataPoints"]).and_then(as_integer),
            derivation_id: first(obj, &["derivationId"]).and_then(as_integer),
            min_value: first(obj, &["min"]).and_then(as_number),
            max_value: first(obj, &["max"]).and_then(as_number),
            median_value: first(obj, &["median"]).and_then(as_number),
            footnote: text(obj, &["footnote"]),
            min_year_acquired: first(obj, &["minYearAcquired"]).and_then(as_integer),
        })
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Nutrient {}", self.nutrient_id))
    }
}

impl PortionDraft {
    pub fn resolve(entry: &Value) -> Option<Self> {
        let obj = entry.as_object()?;
        let unit = obj.get("measureUnit").and_then(Value::as_object);

        Some(Self {
            seq_num: first(obj, &["sequenceNumber"]).and_then(as_integer),
            amount: first(obj, &["amount"])
                .and_then(as_number)
                .unwrap_or(DEFAULT_PORTION_AMOUNT),
            measure_unit_id: first(obj, &["measureUnitId"])
                .or_else(|| unit.and_then(|u| first(u, &["id"])))
                .and_then(as_integer),
            measure_unit_name: text(obj, &["measureUnitName"])
                .or_else(|| unit.and_then(|u| text(u, &["name"]))),
            measure_unit_abbreviation: text(obj, &["measureUnitAbbreviation"])
                .or_else(|| unit.and_then(|u| text(u, &["abbreviation"]))),
            modifier: text(obj, &["modifier"]),
            gram_weight: first(obj, &["gramWeight"])
                .and_then(as_number)
                .unwrap_or(DEFAULT_GRAM_WEIGHT),
            data_points: first(obj, &["dataPoints"]).and_then(as_integer),
            footnote: text(obj, &["footnote"]),
            min_year_acquired: first(obj, &["minYearAcquired"]).and_then(as_integer),
        })
    }
}

fn resolve_fdc_id(obj: &Map<String, Value>) -> Result<i64, StoreError> {
    for key in FDC_ID {
        let malformed = || StoreError::validation(format!("Malformed FDC ID in field '{key}'"));
        match obj.get(*key) {
            None | Some(Value::Null) => continue,
            Some(Value::Number(n)) => match n.as_i64() {
                Some(0) => continue,
                Some(id) if id > 0 => return Ok(id),
                _ => return Err(malformed()),
            },
            Some(Value::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    continue;
                }
                match s.parse::<i64>() {
                    Ok(0) => continue,
                    Ok(id) if id > 0 => return Ok(id),
                    _ => return Err(malformed()),
                }
            }
            Some(_) => return Err(malformed()),
        }
    }
    Err(StoreError::validation("No FDC ID found in food data"))
}

fn resolve_category(obj: &Map<String, Value>) -> (Option<String>, Option<i64>) {
    match obj.get("foodCategory") {
        Some(Value::Object(cat)) => (
            text(cat, &["description"]),
            first(cat, &["id"])
                .and_then(as_integer)
                .or_else(|| first(obj, FOOD_CATEGORY_ID).and_then(as_integer)),
        ),
        _ => (
            text(obj, FOOD_CATEGORY),
            first(obj, FOOD_CATEGORY_ID).and_then(as_integer),
        ),
    }
}

/// Keeps the first entry per nutrient id; later repeats would collide with
/// the (food, nutrient) uniqueness rule and are dropped.
fn resolve_nutrients(obj: &Map<String, Value>) -> Vec<NutrientDraft> {
    let mut out: Vec<NutrientDraft> = Vec::new();
    for draft in entries(obj, NUTRIENTS).filter_map(NutrientDraft::resolve) {
        if out.iter().any(|n| n.nutrient_id == draft.nutrient_id) {
            tracing::debug!(nutrient_id = draft.nutrient_id, "repeated nutrient entry skipped");
            continue;
        }
        out.push(draft);
    }
    out
}

fn entries<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

fn first<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| match obj.get(*k) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(v) => Some(v),
    })
}

fn text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match obj.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

fn date(obj: &Map<String, Value>, keys: &[&str]) -> Option<Date> {
    first(obj, keys).and_then(Value::as_str).and_then(parse_date)
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn as_integer(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn as_positive_id(v: &Value) -> Option<i64> {
    as_integer(v).filter(|id| *id > 0)
}

/// Accepts `YYYY-MM-DD`, ISO date-times (with or without offset) and the
/// provider's `M/D/YYYY`.
pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if let Ok(d) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(d);
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt.date());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(dt.date());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
    ) {
        return Some(dt.date());
    }
    Date::parse(
        raw,
        format_description!("[month padding:none]/[day padding:none]/[year]"),
    )
    .ok()
}
