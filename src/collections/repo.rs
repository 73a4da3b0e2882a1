use sqlx::SqlitePool;
use time::OffsetDateTime;

use super::repo_types::CollectionRow;
use crate::db::timestamp;
use crate::foods::repo_types::FoodRow;

const COLLECTION_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, c.color, c.created_at,
           COUNT(fc.id) AS food_count
      FROM collections c
      LEFT JOIN food_collections fc ON fc.collection_id = c.id
"#;

pub async fn insert_collection(
    db: &SqlitePool,
    name: &str,
    description: Option<&str>,
    color: &str,
    now: OffsetDateTime,
) -> Result<i64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO collections (name, description, color, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(name)
    .bind(description)
    .bind(color)
    .bind(timestamp(now))
    .execute(db)
    .await?;
    Ok(res.last_insert_rowid())
}

pub async fn list_collections(db: &SqlitePool) -> Result<Vec<CollectionRow>, sqlx::Error> {
    sqlx::query_as::<_, CollectionRow>(&format!(
        "{COLLECTION_SELECT} GROUP BY c.id ORDER BY c.name COLLATE NOCASE, c.id"
    ))
    .fetch_all(db)
    .await
}

pub async fn get_collection(db: &SqlitePool, id: i64) -> Result<Option<CollectionRow>, sqlx::Error> {
    sqlx::query_as::<_, CollectionRow>(&format!(
        "{COLLECTION_SELECT} WHERE c.id = $1 GROUP BY c.id"
    ))
    .bind(id)
    .fetch_optional(db)
    .await
}

/// Memberships go with it (cascade).
pub async fn delete_collection(db: &SqlitePool, id: i64) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM collections WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

/// Zero rows affected means the food was already a member.
pub async fn add_food(
    db: &SqlitePool,
    collection_id: i64,
    food_id: i64,
    now: OffsetDateTime,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"
        INSERT INTO food_collections (food_id, collection_id, added_at)
        VALUES ($1, $2, $3)
        ON CONFLICT (food_id, collection_id) DO NOTHING
        "#,
    )
    .bind(food_id)
    .bind(collection_id)
    .bind(timestamp(now))
    .execute(db)
    .await?;
    Ok(res.rows_affected())
}

pub async fn remove_food(
    db: &SqlitePool,
    collection_id: i64,
    food_id: i64,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query("DELETE FROM food_collections WHERE collection_id = $1 AND food_id = $2")
        .bind(collection_id)
        .bind(food_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected())
}

/// Member foods, most recently added first.
pub async fn food_rows(
    db: &SqlitePool,
    collection_id: i64,
    limit: i64,
) -> Result<Vec<FoodRow>, sqlx::Error> {
    sqlx::query_as::<_, FoodRow>(
        r#"
        SELECT f.id, f.fdc_id, f.description, f.brand_owner, f.brand_name, f.subbrand_name,
               f.data_type, f.food_category, f.food_category_id,
               f.published_date, f.modified_date, f.available_date,
               f.ingredients, f.market_country, f.serving_size, f.serving_size_unit,
               f.household_serving_fulltext, f.saved_at, f.updated_at
          FROM food_collections fc
          JOIN foods f ON f.id = fc.food_id
         WHERE fc.collection_id = $1
         ORDER BY fc.added_at DESC, fc.id DESC
         LIMIT $2
        "#,
    )
    .bind(collection_id)
    .bind(limit)
    .fetch_all(db)
    .await
}
