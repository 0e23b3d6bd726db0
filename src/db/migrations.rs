//! Database initialization and versioned schema migration.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Schema version recorded in `PRAGMA user_version` once `schema.sql` is applied.
pub const SCHEMA_VERSION: i64 = 1;

/// Open (creating if needed) the SQLite database and bring its schema up to date.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    info!(path = %db_path, version = SCHEMA_VERSION, "Database ready");
    Ok(pool)
}

/// Apply `schema.sql` in one transaction when the stored version is behind.
async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if current > SCHEMA_VERSION {
        return Err(sqlx::Error::Protocol(format!(
            "database schema version {} is newer than supported version {}",
            current, SCHEMA_VERSION
        )));
    }
    if current == SCHEMA_VERSION {
        debug!(version = current, "Schema up to date");
        return Ok(());
    }

    let mut tx = pool.begin().await?;
    for statement in include_str!("schema.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(from = current, to = SCHEMA_VERSION, "Schema migrated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn fresh_pool(temp_dir: &TempDir) -> SqlitePool {
        let db_path = temp_dir.path().join("nav.db");
        init_db(db_path.to_str().unwrap())
            .await
            .expect("init_db failed")
    }

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_db_creates_store_tables() {
        let temp_dir = TempDir::new().unwrap();
        let pool = fresh_pool(&temp_dir).await;

        assert_eq!(
            table_names(&pool).await,
            vec![
                "asset_prices",
                "daily_prices",
                "exchange_whitelist",
                "listing_dates",
                "rebalance_snapshots",
            ]
        );
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_init_db_creates_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("nav.db");
        init_db(db_path.to_str().unwrap()).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let pool = fresh_pool(&temp_dir).await;
        sqlx::query("INSERT INTO asset_prices (asset_id, day_ts, price, created_at) VALUES ('btc', 0, '1', 0)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;

        let pool = fresh_pool(&temp_dir).await;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM asset_prices")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let pool = fresh_pool(&temp_dir).await;
        sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION + 1))
            .execute(&pool)
            .await
            .unwrap();

        assert!(matches!(migrate(&pool).await, Err(sqlx::Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let temp_dir = TempDir::new().unwrap();
        let pool = fresh_pool(&temp_dir).await;
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
