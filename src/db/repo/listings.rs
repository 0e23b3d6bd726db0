use super::Repository;
use crate::domain::{Exchange, ListingDates, ListingDirectory, ListingRecord, Timestamp};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

impl Repository {
    /// Insert or replace the per-exchange dates of a listing record.
    ///
    /// Exchanges absent from `record` are left as stored.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn upsert_listing(&self, record: &ListingRecord) -> Result<(), sqlx::Error> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for (exchange, dates) in &record.exchanges {
            sqlx::query(
                r#"
                INSERT INTO listing_dates (
                    ticker, base_symbol, exchange,
                    listing_announced_at, listing_effective_at,
                    delisting_announced_at, delisting_effective_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(ticker, exchange) DO UPDATE SET
                    base_symbol = excluded.base_symbol,
                    listing_announced_at = excluded.listing_announced_at,
                    listing_effective_at = excluded.listing_effective_at,
                    delisting_announced_at = excluded.delisting_announced_at,
                    delisting_effective_at = excluded.delisting_effective_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.ticker)
            .bind(&record.base_symbol)
            .bind(exchange.as_str())
            .bind(dates.listing_announced_at.map(|t| t.as_i64()))
            .bind(dates.listing_effective_at.map(|t| t.as_i64()))
            .bind(dates.delisting_announced_at.map(|t| t.as_i64()))
            .bind(dates.delisting_effective_at.map(|t| t.as_i64()))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Replace the whitelist of an exchange with `tickers`.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn replace_whitelist(
        &self,
        exchange: Exchange,
        tickers: &[String],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM exchange_whitelist WHERE exchange = ?")
            .bind(exchange.as_str())
            .execute(&mut *tx)
            .await?;

        for ticker in tickers {
            sqlx::query(
                r#"
                INSERT INTO exchange_whitelist (exchange, ticker) VALUES (?, ?)
                ON CONFLICT(exchange, ticker) DO NOTHING
                "#,
            )
            .bind(exchange.as_str())
            .bind(ticker.trim().to_uppercase())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load the whole Listing Directory and all whitelists into memory.
    ///
    /// Rows with an unknown exchange are skipped with a warning.
    ///
    /// # Errors
    /// Returns an error if a query fails.
    pub async fn load_listing_directory(&self) -> Result<ListingDirectory, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT ticker, base_symbol, exchange,
                   listing_announced_at, listing_effective_at,
                   delisting_announced_at, delisting_effective_at
            FROM listing_dates
            ORDER BY ticker ASC, exchange ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<ListingRecord> = Vec::new();
        for row in rows {
            let ticker: String = row.get("ticker");
            let exchange_str: String = row.get("exchange");
            let Ok(exchange) = Exchange::from_str(&exchange_str) else {
                warn!(ticker = %ticker, exchange = %exchange_str, "Skipping listing row with unknown exchange");
                continue;
            };
            let dates = ListingDates {
                listing_announced_at: row
                    .get::<Option<i64>, _>("listing_announced_at")
                    .map(Timestamp::new),
                listing_effective_at: row
                    .get::<Option<i64>, _>("listing_effective_at")
                    .map(Timestamp::new),
                delisting_announced_at: row
                    .get::<Option<i64>, _>("delisting_announced_at")
                    .map(Timestamp::new),
                delisting_effective_at: row
                    .get::<Option<i64>, _>("delisting_effective_at")
                    .map(Timestamp::new),
            };

            match records.last_mut() {
                Some(last) if last.ticker == ticker => {
                    last.exchanges.insert(exchange, dates);
                }
                _ => {
                    let base: String = row.get("base_symbol");
                    records.push(ListingRecord::new(&ticker, &base).with_exchange(exchange, dates));
                }
            }
        }

        let mut directory = ListingDirectory::new();
        for record in records {
            directory.insert(record);
        }

        let whitelist_rows = sqlx::query("SELECT exchange, ticker FROM exchange_whitelist")
            .fetch_all(&self.pool)
            .await?;
        for row in whitelist_rows {
            let exchange_str: String = row.get("exchange");
            let ticker: String = row.get("ticker");
            match Exchange::from_str(&exchange_str) {
                Ok(exchange) => directory.whitelist(exchange, [ticker]),
                Err(_) => {
                    warn!(exchange = %exchange_str, "Skipping whitelist row with unknown exchange")
                }
            }
        }

        Ok(directory)
    }
}
