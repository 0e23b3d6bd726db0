//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by store:
//! - `mod.rs` - Price Store (append-only asset prices)
//! - `listings.rs` - Listing Directory and exchange whitelists
//! - `snapshots.rs` - Snapshot Store
//! - `daily.rs` - Daily Price Store

mod daily;
mod listings;
mod snapshots;

use crate::domain::{calendar, AssetId, Decimal, PricePoint, Timestamp};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    /// Returns an error if the pool cannot serve a connection.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Price Store
    // =========================================================================

    /// Append daily prices for an asset. Timestamps are floored to UTC midnight
    /// and existing days are left untouched.
    ///
    /// Returns the number of newly stored days.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_asset_prices(
        &self,
        asset_id: &AssetId,
        points: &[PricePoint],
    ) -> Result<usize, sqlx::Error> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = chrono::Utc::now().timestamp();
        let mut inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for point in points {
            let result = sqlx::query(
                r#"
                INSERT INTO asset_prices (asset_id, day_ts, price, created_at)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(asset_id, day_ts) DO NOTHING
                "#,
            )
            .bind(asset_id.as_str())
            .bind(calendar::floor_to_midnight(point.timestamp).as_i64())
            .bind(point.price.to_canonical_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Price of an asset on the UTC day containing `at`, if stored.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored price is malformed.
    pub async fn get_asset_price(
        &self,
        asset_id: &AssetId,
        at: Timestamp,
    ) -> Result<Option<Decimal>, sqlx::Error> {
        let row = sqlx::query("SELECT price FROM asset_prices WHERE asset_id = ? AND day_ts = ?")
            .bind(asset_id.as_str())
            .bind(calendar::floor_to_midnight(at).as_i64())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decimal_column(&r, "price")).transpose()
    }

    /// Stored prices of an asset with `from <= day <= to`, ascending.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored price is malformed.
    pub async fn query_asset_prices(
        &self,
        asset_id: &AssetId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<PricePoint>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT day_ts, price
            FROM asset_prices
            WHERE asset_id = ? AND day_ts >= ? AND day_ts <= ?
            ORDER BY day_ts ASC
            "#,
        )
        .bind(asset_id.as_str())
        .bind(from.as_i64())
        .bind(to.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, sqlx::Error>(PricePoint::new(
                    Timestamp::new(r.get("day_ts")),
                    decimal_column(r, "price")?,
                ))
            })
            .collect()
    }
}

/// Decode a canonical decimal string column.
fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}
