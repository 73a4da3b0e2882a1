use serde_json::Value;
use sqlx::{types::Json, QueryBuilder, Sqlite, SqlitePool, Transaction};
use time::OffsetDateTime;

use super::payload::{FoodDraft, NutrientDraft, PortionDraft};
use super::repo_types::{FoodNutrientRow, FoodPortionRow, FoodRow, NutrientRow};
use crate::db::timestamp;

const FOOD_COLUMNS: &str = r#"
    id, fdc_id, description, brand_owner, brand_name, subbrand_name,
    data_type, food_category, food_category_id,
    published_date, modified_date, available_date,
    ingredients, market_country, serving_size, serving_size_unit,
    household_serving_fulltext, saved_at, updated_at
"#;

/// Case folding applied to searchable text, both when it is stored and to
/// the query. SQLite's `lower()` only folds ASCII.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

fn folded_column(column: &str) -> Option<&'static str> {
    match column {
        "description" => Some("description_folded"),
        "brand_owner" => Some("brand_owner_folded"),
        _ => None,
    }
}

// ---- Writes ----

/// Insert the food row and return its id.
pub async fn insert_food_tx(
    tx: &mut Transaction<'_, Sqlite>,
    draft: &FoodDraft,
    raw: &Value,
    now: OffsetDateTime,
) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO foods (
            fdc_id, description, brand_owner, brand_name, subbrand_name,
            data_type, food_category, food_category_id,
            published_date, modified_date, available_date,
            ingredients, market_country, serving_size, serving_size_unit,
            household_serving_fulltext, raw_data, saved_at, updated_at,
            description_folded, brand_owner_folded
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18, $19, $20)
        "#,
    )
    .bind(draft.fdc_id)
    .bind(&draft.description)
    .bind(&draft.brand_owner)
    .bind(&draft.brand_name)
    .bind(&draft.subbrand_name)
    .bind(&draft.data_type)
    .bind(&draft.food_category)
    .bind(draft.food_category_id)
    .bind(draft.published_date)
    .bind(draft.modified_date)
    .bind(draft.available_date)
    .bind(&draft.ingredients)
    .bind(&draft.market_country)
    .bind(draft.serving_size)
    .bind(&draft.serving_size_unit)
    .bind(&draft.household_serving_fulltext)
    .bind(Json(raw))
    .bind(timestamp(now))
    .bind(fold_case(&draft.description))
    .bind(draft.brand_owner.as_deref().map(fold_case))
    .execute(&mut **tx)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Insert the reference row unless one already exists for this id; an
/// existing row is never overwritten.
pub async fn ensure_nutrient_tx(
    tx: &mut Transaction<'_, Sqlite>,
    n: &NutrientDraft,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO nutrients (id, name, unit_name, nutrient_nbr, rank)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(n.nutrient_id)
    .bind(n.display_name())
    .bind(n.unit_name.as_deref().unwrap_or(""))
    .bind(n.number)
    .bind(n.rank)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn insert_food_nutrient_tx(
    tx: &mut Transaction<'_, Sqlite>,
    food_id: i64,
    n: &NutrientDraft,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO food_nutrients (
            food_id, nutrient_id, amount, data_points, derivation_id,
            min_value, max_value, median_value, footnote, min_year_acquired
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(food_id)
    .bind(n.nutrient_id)
    .bind(n.amount)
    .bind(n.data_points)
    .bind(n.derivation_id)
    .bind(n.min_value)
    .bind(n.max_value)
    .bind(n.median_value)
    .bind(&n.footnote)
    .bind(n.min_year_acquired)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn insert_portion_tx(
    tx: &mut Transaction<'_, Sqlite>,
    food_id: i64,
    p: &PortionDraft,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO food_portions (
            food_id, seq_num, amount, measure_unit_id, measure_unit_name,
            measure_unit_abbreviation, modifier, gram_weight, data_points,
            footnote, min_year_acquired
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(food_id)
    .bind(p.seq_num)
    .bind(p.amount)
    .bind(p.measure_unit_id)
    .bind(&p.measure_unit_name)
    .bind(&p.measure_unit_abbreviation)
    .bind(&p.modifier)
    .bind(p.gram_weight)
    .bind(p.data_points)
    .bind(&p.footnote)
    .bind(p.min_year_acquired)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// New value for one mutable column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(Option<String>),
    Real(Option<f64>),
}

/// `columns` must come from a fixed allow-list; names are spliced into SQL.
pub async fn update_columns_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    columns: &[(&'static str, ColumnValue)],
    now: OffsetDateTime,
) -> Result<u64, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new("UPDATE foods SET ");
    {
        let mut set = qb.separated(", ");
        for (column, value) in columns {
            set.push(format!("{column} = "));
            match value {
                ColumnValue::Text(v) => set.push_bind_unseparated(v.clone()),
                ColumnValue::Real(v) => set.push_bind_unseparated(*v),
            };
            if let (Some(folded), ColumnValue::Text(v)) = (folded_column(column), value) {
                set.push(format!("{folded} = "));
                set.push_bind_unseparated(v.as_deref().map(fold_case));
            }
        }
        set.push("updated_at = ");
        set.push_bind_unseparated(timestamp(now));
    }
    qb.push(" WHERE id = ");
    qb.push_bind(id);

    let res = qb.build().execute(&mut **tx).await?;
    Ok(res.rows_affected())
}

pub async fn delete_food_tx(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM foods WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(res.rows_affected())
}

// ---- Queries ----

pub async fn find_id_by_fdc(db: &SqlitePool, fdc_id: i64) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM foods WHERE fdc_id = $1")
        .bind(fdc_id)
        .fetch_optional(db)
        .await
}

pub async fn food_exists(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let found = sqlx::query_scalar::<_, i64>("SELECT 1 FROM foods WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(found.is_some())
}

pub async fn get_food(db: &SqlitePool, id: i64) -> Result<Option<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(&format!("SELECT {FOOD_COLUMNS} FROM foods WHERE id = $1"))
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn get_food_by_fdc(db: &SqlitePool, fdc_id: i64) -> Result<Option<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(&format!("SELECT {FOOD_COLUMNS} FROM foods WHERE fdc_id = $1"))
        .bind(fdc_id)
        .fetch_optional(db)
        .await
}

pub async fn list_foods(
    db: &SqlitePool,
    limit: i64,
    offset: i64,
) -> Result<Vec<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(&format!(
        r#"
        SELECT {FOOD_COLUMNS}
          FROM foods
         ORDER BY saved_at DESC, id DESC
         LIMIT $1 OFFSET $2
        "#
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
}

/// `pattern` is a LIKE pattern over [`fold_case`]d text, escaped with `\`.
pub async fn search_foods(
    db: &SqlitePool,
    pattern: &str,
    limit: i64,
) -> Result<Vec<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(&format!(
        r#"
        SELECT {FOOD_COLUMNS}
          FROM foods
         WHERE description_folded LIKE $1 ESCAPE '\'
            OR brand_owner_folded LIKE $1 ESCAPE '\'
         ORDER BY saved_at DESC, id DESC
         LIMIT $2
        "#
    ))
    .bind(pattern)
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn foods_by_data_type(
    db: &SqlitePool,
    data_type: &str,
    limit: i64,
) -> Result<Vec<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(&format!(
        r#"
        SELECT {FOOD_COLUMNS}
          FROM foods
         WHERE data_type = $1
         ORDER BY saved_at DESC, id DESC
         LIMIT $2
        "#
    ))
    .bind(data_type)
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn nutrients_for_foods(
    db: &SqlitePool,
    food_ids: &[i64],
) -> Result<Vec<FoodNutrientRow>, sqlx::Error> {
    if food_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT fnt.food_id, fnt.nutrient_id, fnt.amount, fnt.data_points, fnt.derivation_id,
               fnt.min_value, fnt.max_value, fnt.median_value, fnt.footnote,
               fnt.min_year_acquired, n.name AS nutrient_name, n.unit_name AS nutrient_unit
          FROM food_nutrients fnt
          LEFT JOIN nutrients n ON n.id = fnt.nutrient_id
         WHERE fnt.food_id IN (
        "#,
    );
    let mut ids = qb.separated(", ");
    for id in food_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY fnt.food_id, n.rank IS NULL, n.rank, fnt.nutrient_id");
    qb.build_query_as::<FoodNutrientRow>().fetch_all(db).await
}

pub async fn portions_for_foods(
    db: &SqlitePool,
    food_ids: &[i64],
) -> Result<Vec<FoodPortionRow>, sqlx::Error> {
    if food_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        r#"
        SELECT id, food_id, seq_num, amount, measure_unit_id, measure_unit_name,
               measure_unit_abbreviation, modifier, gram_weight, data_points,
               footnote, min_year_acquired
          FROM food_portions
         WHERE food_id IN (
        "#,
    );
    let mut ids = qb.separated(", ");
    for id in food_ids {
        ids.push_bind(*id);
    }
    ids.push_unseparated(") ORDER BY food_id, seq_num IS NULL, seq_num, id");
    qb.build_query_as::<FoodPortionRow>().fetch_all(db).await
}

pub async fn raw_payload(db: &SqlitePool, id: i64) -> Result<Option<Value>, sqlx::Error> {
    let raw = sqlx::query_scalar::<_, Json<Value>>("SELECT raw_data FROM foods WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(raw.map(|Json(v)| v))
}

pub async fn list_nutrients(db: &SqlitePool) -> Result<Vec<NutrientRow>, sqlx::Error> {
    sqlx::query_as::<_, NutrientRow>(
        r#"
        SELECT id, name, unit_name, nutrient_nbr, rank
          FROM nutrients
         ORDER BY rank IS NULL, rank, id
        "#,
    )
    .fetch_all(db)
    .await
}

// ---- Aggregates ----

/// (total foods, distinct non-null brand owners, distinct data types)
pub async fn counts(db: &SqlitePool) -> Result<(i64, i64, i64), sqlx::Error> {
    sqlx::query_as::<_, (i64, i64, i64)>(
        r#"
        SELECT COUNT(*), COUNT(DISTINCT brand_owner), COUNT(DISTINCT data_type)
          FROM foods
        "#,
    )
    .fetch_one(db)
    .await
}

pub async fn last_saved_at(db: &SqlitePool) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    sqlx::query_scalar::<_, OffsetDateTime>(
        "SELECT saved_at FROM foods ORDER BY saved_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(db)
    .await
}

#[cfg(test)]
pub async fn count_rows(db: &SqlitePool, table: &'static str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db)
        .await
}
