use serde::Serialize;
use sqlx::{FromRow, Sqlite, SqliteExecutor, SqlitePool};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::db::timestamp;

/// Kinds of actions the history log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Search,
    Save,
    DuplicateSave,
    Update,
    Delete,
    View,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            HistoryAction::Search => "search",
            HistoryAction::Save => "save",
            HistoryAction::DuplicateSave => "duplicate_save",
            HistoryAction::Update => "update",
            HistoryAction::Delete => "delete",
            HistoryAction::View => "view",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NewHistoryEntry<'a> {
    pub action: HistoryAction,
    pub search_query: Option<&'a str>,
    pub food_id: Option<i64>,
    pub ip_address: Option<&'a str>,
}

impl<'a> NewHistoryEntry<'a> {
    pub fn food(action: HistoryAction, food_id: i64, ip_address: Option<&'a str>) -> Self {
        Self {
            action,
            search_query: None,
            food_id: Some(food_id),
            ip_address,
        }
    }

    pub fn search(query: &'a str, ip_address: Option<&'a str>) -> Self {
        Self {
            action: HistoryAction::Search,
            search_query: Some(query),
            food_id: None,
            ip_address,
        }
    }
}

/// History row as returned to clients; `food_name` is null once the food is gone.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HistoryEntry {
    pub id: i64,
    pub search_query: Option<String>,
    pub food_id: Option<i64>,
    pub action: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub food_name: Option<String>,
}

/// Append a history row. Never fails: the log is observational, so a write
/// error is reported and dropped.
pub async fn record<'e, E>(db: E, entry: NewHistoryEntry<'_>)
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query::<Sqlite>(
        r#"
        INSERT INTO search_history (search_query, food_id, action, timestamp, ip_address)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(entry.search_query)
    .bind(entry.food_id)
    .bind(entry.action.as_str())
    .bind(timestamp(OffsetDateTime::now_utc()))
    .bind(entry.ip_address)
    .execute(db)
    .await;

    match res {
        Ok(_) => debug!(action = entry.action.as_str(), food_id = ?entry.food_id, "history recorded"),
        Err(e) => warn!(error = %e, action = entry.action.as_str(), "history write failed; ignoring"),
    }
}

pub async fn list_recent(db: &SqlitePool, limit: i64) -> Result<Vec<HistoryEntry>, sqlx::Error> {
    sqlx::query_as::<_, HistoryEntry>(
        r#"
        SELECT h.id, h.search_query, h.food_id, h.action, h.timestamp,
               f.description AS food_name
          FROM search_history h
          LEFT JOIN foods f ON f.id = h.food_id
         ORDER BY h.timestamp DESC, h.id DESC
         LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

#[cfg(test)]
pub async fn count_actions(
    db: &SqlitePool,
    action: HistoryAction,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM search_history WHERE action = $1")
        .bind(action.as_str())
        .fetch_one(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn record_and_list_newest_first() {
        let db = test_pool().await;
        record(&db, NewHistoryEntry::search("milk", Some("10.0.0.1"))).await;
        record(&db, NewHistoryEntry::food(HistoryAction::View, 42, None)).await;

        let rows = list_recent(&db, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].action, "view");
        assert_eq!(rows[0].food_id, Some(42));
        // no such food: the reference dangles and resolves to no name
        assert_eq!(rows[0].food_name, None);
        assert_eq!(rows[1].search_query.as_deref(), Some("milk"));

        let ip = sqlx::query_scalar::<_, Option<String>>(
            "SELECT ip_address FROM search_history WHERE action = 'search'",
        )
        .fetch_one(&db)
        .await
        .unwrap();
        assert_eq!(ip.as_deref(), Some("10.0.0.1"));

        assert_eq!(count_actions(&db, HistoryAction::Search).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn record_swallows_failures() {
        let db = test_pool().await;
        sqlx::query("DROP TABLE search_history").execute(&db).await.unwrap();
        // must not panic or propagate
        record(&db, NewHistoryEntry::search("anything", None)).await;
    }

    #[test]
    fn action_names_match_serde() {
        for action in [
            HistoryAction::Search,
            HistoryAction::Save,
            HistoryAction::DuplicateSave,
            HistoryAction::Update,
            HistoryAction::Delete,
            HistoryAction::View,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, action.as_str());
        }
    }
}
