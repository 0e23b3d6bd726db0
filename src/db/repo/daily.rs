use super::{decimal_column, Repository};
use crate::domain::{calendar, DailyNavPoint, Decimal, IndexId, Quantities, Timestamp};
use sqlx::Row;
use std::collections::BTreeMap;

impl Repository {
    /// Upsert one Daily NAV Point keyed by `(index_id, day)`.
    ///
    /// # Errors
    /// Returns an error if encoding or the insert fails.
    pub async fn upsert_daily_price(&self, point: &DailyNavPoint) -> Result<(), sqlx::Error> {
        let quantities = serde_json::to_string(&point.quantities)
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO daily_prices (index_id, day_ts, date, price, quantities, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(index_id, day_ts) DO UPDATE SET
                price = excluded.price,
                quantities = excluded.quantities,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(point.index_id.as_str())
        .bind(point.day.as_i64())
        .bind(point.date().format("%Y-%m-%d").to_string())
        .bind(point.price.to_canonical_string())
        .bind(quantities)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Daily NAV Points of an index with `from <= day <= to`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn query_daily_prices(
        &self,
        index_id: &IndexId,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<DailyNavPoint>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT day_ts, price, quantities
            FROM daily_prices
            WHERE index_id = ? AND day_ts >= ? AND day_ts <= ?
            ORDER BY day_ts ASC
            "#,
        )
        .bind(index_id.as_str())
        .bind(from.map(|t| t.as_i64()).unwrap_or(i64::MIN))
        .bind(to.map(|t| t.as_i64()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                let raw: String = r.try_get("quantities")?;
                let quantities: Quantities =
                    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
                        index: "quantities".to_string(),
                        source: Box::new(e),
                    })?;
                Ok::<_, sqlx::Error>(DailyNavPoint {
                    index_id: index_id.clone(),
                    day: Timestamp::new(r.try_get("day_ts")?),
                    price: decimal_column(r, "price")?,
                    quantities,
                })
            })
            .collect()
    }

    /// Stored NAV by day for an index, without quantities.
    ///
    /// # Errors
    /// Returns an error if the query fails or a price is malformed.
    pub async fn query_daily_price_map(
        &self,
        index_id: &IndexId,
    ) -> Result<BTreeMap<Timestamp, Decimal>, sqlx::Error> {
        let rows = sqlx::query("SELECT day_ts, price FROM daily_prices WHERE index_id = ?")
            .bind(index_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                Ok::<_, sqlx::Error>((
                    calendar::floor_to_midnight(Timestamp::new(r.try_get("day_ts")?)),
                    decimal_column(r, "price")?,
                ))
            })
            .collect()
    }
}
