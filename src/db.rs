use std::str::FromStr;

use anyhow::Context;
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use time::{macros::format_description, OffsetDateTime, UtcOffset};

use crate::config::DatabaseConfig;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn connect(cfg: &DatabaseConfig) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&cfg.url)
        .with_context(|| format!("parse DATABASE_URL {}", cfg.url))?
        .create_if_missing(true)
        .foreign_keys(true);

    let db = SqlitePoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect_with(options)
        .await
        .context("connect to database")?;
    Ok(db)
}

pub async fn migrate(db: &SqlitePool) -> anyhow::Result<()> {
    MIGRATOR.run(db).await.context("run migrations")?;
    Ok(())
}

/// Stored text form of a timestamp: UTC with all nine subsecond digits, so
/// that text order matches time order.
pub fn timestamp(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:9]Z"
    );
    utc.format(&format).unwrap_or_else(|_| utc.to_string())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("memory url")
        .foreign_keys(true);
    // every connection to :memory: is its own database, so keep exactly one alive
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .expect("open in-memory sqlite");
    migrate(&db).await.expect("migrations apply");
    db
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn stored_timestamps_are_fixed_width() {
        let whole = timestamp(datetime!(2024-05-01 12:00:00 UTC));
        let later = timestamp(datetime!(2024-05-01 12:00:00.5 UTC));
        assert_eq!(whole, "2024-05-01T12:00:00.000000000Z");
        assert_eq!(later, "2024-05-01T12:00:00.500000000Z");
        assert_eq!(whole.len(), later.len());
        assert!(whole < later);

        let shifted = timestamp(datetime!(2024-05-01 14:00:00 +02:00));
        assert_eq!(shifted, whole);
    }
}
