use std::collections::HashMap;

use serde_json::{Map, Value};
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use super::dto::{
    clamp_limit, DeleteOutcome, FoodStats, HealthReport, IngestOutcome, UpdateOutcome,
};
use super::payload::FoodDraft;
use super::repo::{self, ColumnValue};
use super::repo_types::{FoodNutrientRow, FoodPortionRow, FoodRow, NutrientRow};
use super::view::{FoodView, NutrientSummary};
use crate::error::StoreError;
use crate::history::{self, HistoryAction, HistoryEntry, NewHistoryEntry};

/// Columns a caller may change through [`FoodStorage::update`], in the order
/// they are applied and reported. Anything else in the input is ignored.
const UPDATABLE: &[(&str, Column)] = &[
    ("description", Column::RequiredText),
    ("brand_owner", Column::Text),
    ("brand_name", Column::Text),
    ("subbrand_name", Column::Text),
    ("ingredients", Column::Text),
    ("market_country", Column::Text),
    ("serving_size", Column::Real),
    ("serving_size_unit", Column::Text),
];

#[derive(Debug, Clone, Copy)]
enum Column {
    RequiredText,
    Text,
    Real,
}

/// Ingestion and query service over the normalized food tables.
#[derive(Clone)]
pub struct FoodStorage {
    db: SqlitePool,
}

impl FoodStorage {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Normalize and persist one provider payload. Re-ingesting a known
    /// external id changes nothing except the history log.
    #[instrument(skip(self, payload))]
    pub async fn ingest(
        &self,
        payload: &Value,
        origin: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        let draft = FoodDraft::resolve(payload)?;

        if let Some(existing) = repo::find_id_by_fdc(&self.db, draft.fdc_id).await? {
            return self.duplicate(existing, origin).await;
        }

        self.save_new(&draft, payload, origin).await
    }

    async fn save_new(
        &self,
        draft: &FoodDraft,
        raw: &Value,
        origin: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        let food_id = match self.write_food(draft, raw).await {
            Ok(id) => id,
            Err(e) if StoreError::is_unique_violation(&e) => {
                // lost a race against a concurrent ingestion of the same id
                match repo::find_id_by_fdc(&self.db, draft.fdc_id).await? {
                    Some(existing) => return self.duplicate(existing, origin).await,
                    None => return Err(e.into()),
                }
            }
            Err(e) => {
                warn!(error = %e, fdc_id = draft.fdc_id, "food ingestion failed");
                return Err(e.into());
            }
        };

        history::record(
            &self.db,
            NewHistoryEntry::food(HistoryAction::Save, food_id, origin),
        )
        .await;

        let food = self
            .get_by_internal_id(food_id)
            .await?
            .ok_or_else(|| StoreError::Internal(format!("food {food_id} missing after commit")))?;

        info!(
            food_id,
            fdc_id = food.fdc_id,
            nutrients = food.nutrients.len(),
            portions = food.portions.len(),
            "food saved"
        );
        Ok(IngestOutcome {
            message: "Food saved successfully".into(),
            food,
            duplicate: false,
        })
    }

    /// Food row, nutrient reference rows, associations and portions in one
    /// transaction.
    async fn write_food(&self, draft: &FoodDraft, raw: &Value) -> Result<i64, sqlx::Error> {
        let mut tx = self.db.begin().await?;

        let written = async {
            let food_id =
                repo::insert_food_tx(&mut tx, draft, raw, OffsetDateTime::now_utc()).await?;
            for n in &draft.nutrients {
                repo::ensure_nutrient_tx(&mut tx, n).await?;
                repo::insert_food_nutrient_tx(&mut tx, food_id, n).await?;
            }
            for p in &draft.portions {
                repo::insert_portion_tx(&mut tx, food_id, p).await?;
            }
            Ok::<_, sqlx::Error>(food_id)
        }
        .await;

        match written {
            Ok(food_id) => {
                tx.commit().await?;
                Ok(food_id)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn duplicate(
        &self,
        food_id: i64,
        origin: Option<&str>,
    ) -> Result<IngestOutcome, StoreError> {
        history::record(
            &self.db,
            NewHistoryEntry::food(HistoryAction::DuplicateSave, food_id, origin),
        )
        .await;

        let food = self
            .get_by_internal_id(food_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Food not found"))?;
        info!(food_id, fdc_id = food.fdc_id, "duplicate save ignored");
        Ok(IngestOutcome {
            message: "Food already saved".into(),
            food,
            duplicate: true,
        })
    }

    pub async fn get_by_internal_id(&self, id: i64) -> Result<Option<FoodView>, StoreError> {
        let Some(row) = repo::get_food(&self.db, id).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![row]).await?.pop())
    }

    pub async fn get_by_external_id(&self, fdc_id: i64) -> Result<Option<FoodView>, StoreError> {
        let Some(row) = repo::get_food_by_fdc(&self.db, fdc_id).await? else {
            return Ok(None);
        };
        Ok(self.hydrate(vec![row]).await?.pop())
    }

    pub async fn list_all(&self, limit: i64, offset: i64) -> Result<Vec<FoodView>, StoreError> {
        let rows = repo::list_foods(&self.db, clamp_limit(limit), offset.max(0)).await?;
        self.hydrate(rows).await
    }

    /// Case-insensitive substring match on description or brand owner. An
    /// empty query lists everything instead and is not logged.
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        origin: Option<&str>,
    ) -> Result<Vec<FoodView>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return self.list_all(limit, 0).await;
        }

        history::record(&self.db, NewHistoryEntry::search(query, origin)).await;

        let pattern = format!("%{}%", escape_like(&repo::fold_case(query)));
        let rows = repo::search_foods(&self.db, &pattern, clamp_limit(limit)).await?;
        self.hydrate(rows).await
    }

    pub async fn list_by_category(
        &self,
        data_type: &str,
        limit: i64,
    ) -> Result<Vec<FoodView>, StoreError> {
        let rows = repo::foods_by_data_type(&self.db, data_type, clamp_limit(limit)).await?;
        self.hydrate(rows).await
    }

    #[instrument(skip(self, fields))]
    pub async fn update(
        &self,
        id: i64,
        fields: &Map<String, Value>,
    ) -> Result<UpdateOutcome, StoreError> {
        if !repo::food_exists(&self.db, id).await? {
            return Err(StoreError::not_found("Food not found"));
        }

        let columns = column_updates(fields)?;
        if columns.is_empty() {
            return Err(StoreError::validation("No valid fields to update"));
        }

        let mut tx = self.db.begin().await?;
        let affected =
            repo::update_columns_tx(&mut tx, id, &columns, OffsetDateTime::now_utc()).await?;
        if affected == 0 {
            tx.rollback().await?;
            return Err(StoreError::not_found("Food not found"));
        }
        tx.commit().await?;

        history::record(
            &self.db,
            NewHistoryEntry::food(HistoryAction::Update, id, None),
        )
        .await;

        let updated_fields: Vec<String> = columns.iter().map(|(c, _)| c.to_string()).collect();
        info!(food_id = id, fields = ?updated_fields, "food updated");

        let food = self
            .get_by_internal_id(id)
            .await?
            .ok_or_else(|| StoreError::not_found("Food not found"))?;
        Ok(UpdateOutcome {
            message: "Food updated successfully".into(),
            updated_fields,
            food,
        })
    }

    /// Remove a food together with its nutrient associations and portions.
    /// The `delete` history row is written first and keeps the (now
    /// dangling) id.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome, StoreError> {
        if !repo::food_exists(&self.db, id).await? {
            return Err(StoreError::not_found("Food not found"));
        }

        history::record(
            &self.db,
            NewHistoryEntry::food(HistoryAction::Delete, id, None),
        )
        .await;

        let mut tx = self.db.begin().await?;
        if repo::delete_food_tx(&mut tx, id).await? == 0 {
            tx.rollback().await?;
            return Err(StoreError::not_found("Food not found"));
        }
        tx.commit().await?;

        info!(food_id = id, "food deleted");
        Ok(DeleteOutcome {
            message: "Food deleted successfully".into(),
        })
    }

    /// Never fails; read errors come back as zeroed counters plus `error`.
    pub async fn stats(&self) -> FoodStats {
        let counts = repo::counts(&self.db).await;
        let last_saved = repo::last_saved_at(&self.db).await;
        match (counts, last_saved) {
            (Ok((total_foods, unique_brands, data_types)), Ok(last_saved)) => FoodStats {
                total_foods,
                unique_brands,
                data_types,
                last_saved,
                error: None,
            },
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "stats aggregation failed");
                FoodStats {
                    error: Some(e.to_string()),
                    ..FoodStats::default()
                }
            }
        }
    }

    pub async fn health(&self) -> HealthReport {
        let (status, database_connected, foods_stored, error) = match repo::counts(&self.db).await
        {
            Ok((total, _, _)) => ("healthy", true, total, None),
            Err(e) => {
                warn!(error = %e, "health check failed");
                ("unhealthy", false, 0, Some(e.to_string()))
            }
        };
        HealthReport {
            status,
            component: "Food-Base",
            database_connected,
            foods_stored,
            timestamp: OffsetDateTime::now_utc(),
            error,
        }
    }

    pub async fn nutrient_summary(&self, id: i64) -> Result<Option<NutrientSummary>, StoreError> {
        Ok(self.get_by_internal_id(id).await?.map(|f| f.summary()))
    }

    pub async fn raw_payload(&self, id: i64) -> Result<Option<Value>, StoreError> {
        Ok(repo::raw_payload(&self.db, id).await?)
    }

    pub async fn list_nutrients(&self) -> Result<Vec<NutrientRow>, StoreError> {
        Ok(repo::list_nutrients(&self.db).await?)
    }

    pub async fn record_view(&self, food_id: i64, origin: Option<&str>) {
        history::record(
            &self.db,
            NewHistoryEntry::food(HistoryAction::View, food_id, origin),
        )
        .await;
    }

    pub async fn recent_history(&self, limit: i64) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(history::list_recent(&self.db, clamp_limit(limit)).await?)
    }

    /// Attach nutrients and portions to food rows, keeping row order.
    pub(crate) async fn hydrate(&self, rows: Vec<FoodRow>) -> Result<Vec<FoodView>, StoreError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let mut nutrients: HashMap<i64, Vec<FoodNutrientRow>> = HashMap::new();
        for n in repo::nutrients_for_foods(&self.db, &ids).await? {
            nutrients.entry(n.food_id).or_default().push(n);
        }
        let mut portions: HashMap<i64, Vec<FoodPortionRow>> = HashMap::new();
        for p in repo::portions_for_foods(&self.db, &ids).await? {
            portions.entry(p.food_id).or_default().push(p);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id = row.id;
                FoodView::from_parts(
                    row,
                    nutrients.remove(&id).unwrap_or_default(),
                    portions.remove(&id).unwrap_or_default(),
                )
            })
            .collect())
    }
}

fn column_updates(
    fields: &Map<String, Value>,
) -> Result<Vec<(&'static str, ColumnValue)>, StoreError> {
    let mut out = Vec::new();
    for (name, column) in UPDATABLE {
        let Some(value) = fields.get(*name) else {
            continue;
        };
        let value = match (column, value) {
            (Column::RequiredText | Column::Text, Value::String(s)) => {
                ColumnValue::Text(Some(s.clone()))
            }
            (Column::Text, Value::Null) => ColumnValue::Text(None),
            (Column::Real, Value::Number(n)) => match n.as_f64().filter(|f| f.is_finite()) {
                Some(f) => ColumnValue::Real(Some(f)),
                None => return Err(invalid_field(name)),
            },
            (Column::Real, Value::Null) => ColumnValue::Real(None),
            _ => return Err(invalid_field(name)),
        };
        out.push((*name, value));
    }
    Ok(out)
}

fn invalid_field(name: &str) -> StoreError {
    StoreError::validation(format!("Invalid value for field '{name}'"))
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
