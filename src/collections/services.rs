use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::dto::{CollectionFoods, MembershipOutcome, DEFAULT_COLOR};
use super::repo;
use super::repo_types::CollectionRow;
use crate::error::StoreError;
use crate::foods::{dto::clamp_limit, dto::DeleteOutcome, repo as food_repo, FoodStorage};

fn is_valid_color(color: &str) -> bool {
    lazy_static! {
        static ref COLOR_RE: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
    }
    COLOR_RE.is_match(color)
}

impl FoodStorage {
    #[instrument(skip(self))]
    pub async fn create_collection(
        &self,
        name: &str,
        description: Option<&str>,
        color: Option<&str>,
    ) -> Result<CollectionRow, StoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::validation("Collection name is required"));
        }
        let color = color
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_COLOR);
        if !is_valid_color(color) {
            return Err(StoreError::validation(
                "Color must be a hex value like #007aff",
            ));
        }
        let description = description.map(str::trim).filter(|d| !d.is_empty());

        let id = match repo::insert_collection(
            self.pool(),
            name,
            description,
            color,
            OffsetDateTime::now_utc(),
        )
        .await
        {
            Ok(id) => id,
            Err(e) if StoreError::is_unique_violation(&e) => {
                return Err(StoreError::Integrity(format!(
                    "Collection '{name}' already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        info!(collection_id = id, collection = name, "collection created");
        repo::get_collection(self.pool(), id)
            .await?
            .ok_or_else(|| StoreError::Internal(format!("collection {id} missing after insert")))
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionRow>, StoreError> {
        Ok(repo::list_collections(self.pool()).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_collection(&self, id: i64) -> Result<DeleteOutcome, StoreError> {
        if repo::delete_collection(self.pool(), id).await? == 0 {
            return Err(StoreError::not_found("Collection not found"));
        }
        info!(collection_id = id, "collection deleted");
        Ok(DeleteOutcome {
            message: "Collection deleted successfully".into(),
        })
    }

    #[instrument(skip(self))]
    pub async fn add_to_collection(
        &self,
        collection_id: i64,
        food_id: i64,
    ) -> Result<MembershipOutcome, StoreError> {
        if repo::get_collection(self.pool(), collection_id).await?.is_none() {
            return Err(StoreError::not_found("Collection not found"));
        }
        if !food_repo::food_exists(self.pool(), food_id).await? {
            return Err(StoreError::not_found("Food not found"));
        }

        let inserted =
            repo::add_food(self.pool(), collection_id, food_id, OffsetDateTime::now_utc()).await?;
        let outcome = if inserted == 0 {
            MembershipOutcome {
                message: "Food already in collection".into(),
                already_member: true,
            }
        } else {
            info!(collection_id, food_id, "food added to collection");
            MembershipOutcome {
                message: "Food added to collection".into(),
                already_member: false,
            }
        };
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn remove_from_collection(
        &self,
        collection_id: i64,
        food_id: i64,
    ) -> Result<DeleteOutcome, StoreError> {
        if repo::remove_food(self.pool(), collection_id, food_id).await? == 0 {
            return Err(StoreError::not_found("Food is not in this collection"));
        }
        Ok(DeleteOutcome {
            message: "Food removed from collection".into(),
        })
    }

    pub async fn collection_foods(
        &self,
        collection_id: i64,
        limit: i64,
    ) -> Result<CollectionFoods, StoreError> {
        let collection = repo::get_collection(self.pool(), collection_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Collection not found"))?;
        let rows = repo::food_rows(self.pool(), collection_id, clamp_limit(limit)).await?;
        let foods = self.hydrate(rows).await?;
        Ok(CollectionFoods {
            collection,
            count: foods.len(),
            foods,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::foods::repo::count_rows;
    use serde_json::json;

    async fn storage_with_foods() -> (FoodStorage, i64, i64) {
        let s = FoodStorage::new(test_pool().await);
        let a = s
            .ingest(&json!({"fdcId": 1, "description": "Oats"}), None)
            .await
            .unwrap()
            .food
            .id;
        let b = s
            .ingest(&json!({"fdcId": 2, "description": "Honey"}), None)
            .await
            .unwrap()
            .food
            .id;
        (s, a, b)
    }

    #[test]
    fn color_must_be_six_hex_digits() {
        assert!(is_valid_color("#007aff"));
        assert!(is_valid_color("#ABCDEF"));
        assert!(!is_valid_color("007aff"));
        assert!(!is_valid_color("#fff"));
        assert!(!is_valid_color("#00zzff"));
    }

    #[tokio::test]
    async fn create_validates_and_defaults() {
        let (s, _, _) = storage_with_foods().await;

        let c = s.create_collection("  Breakfast ", None, None).await.unwrap();
        assert_eq!(c.name, "Breakfast");
        assert_eq!(c.color, DEFAULT_COLOR);
        assert_eq!(c.food_count, 0);

        let err = s.create_collection("   ", None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = s
            .create_collection("Lunch", None, Some("red"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = s.create_collection("Breakfast", None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn membership_is_idempotent() {
        let (s, oats, honey) = storage_with_foods().await;
        let c = s
            .create_collection("Breakfast", Some("morning"), Some("#ff9500"))
            .await
            .unwrap();

        assert!(!s.add_to_collection(c.id, oats).await.unwrap().already_member);
        assert!(!s.add_to_collection(c.id, honey).await.unwrap().already_member);
        assert!(s.add_to_collection(c.id, oats).await.unwrap().already_member);
        assert_eq!(count_rows(s.pool(), "food_collections").await.unwrap(), 2);

        let listed = s.list_collections().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].food_count, 2);

        let members = s.collection_foods(c.id, 50).await.unwrap();
        assert_eq!(members.count, 2);
        assert_eq!(members.foods[0].id, honey);

        let err = s.add_to_collection(c.id, 999).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = s.add_to_collection(999, oats).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn removals_cascade() {
        let (s, oats, honey) = storage_with_foods().await;
        let c = s.create_collection("Pantry", None, None).await.unwrap();
        s.add_to_collection(c.id, oats).await.unwrap();
        s.add_to_collection(c.id, honey).await.unwrap();

        s.remove_from_collection(c.id, oats).await.unwrap();
        let err = s.remove_from_collection(c.id, oats).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        // deleting a food drops its memberships
        s.delete(honey).await.unwrap();
        assert_eq!(s.collection_foods(c.id, 50).await.unwrap().count, 0);

        s.add_to_collection(c.id, oats).await.unwrap();
        s.delete_collection(c.id).await.unwrap();
        assert_eq!(count_rows(s.pool(), "food_collections").await.unwrap(), 0);
        // the food itself survives
        assert!(s.get_by_internal_id(oats).await.unwrap().is_some());

        let err = s.delete_collection(c.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let err = s.collection_foods(c.id, 50).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
