use super::{decimal_column, Repository, UpsertOutcome};
use crate::domain::{IndexId, RebalanceSnapshot, Timestamp, SNAPSHOT_SCHEMA_VERSION};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl Repository {
    /// Upsert a snapshot keyed by `(index_id, timestamp)`.
    ///
    /// A snapshot with the same fingerprint as the stored row is not rewritten.
    /// The `deployed` flag of an existing row is always preserved.
    ///
    /// # Errors
    /// Returns an error if encoding or the transaction fails.
    pub async fn upsert_snapshot(
        &self,
        snapshot: &RebalanceSnapshot,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        let payload = snapshot
            .encode_payload()
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        let fingerprint = snapshot.fingerprint();

        let mut tx = self.pool.begin().await?;

        let existing: Option<String> = sqlx::query_scalar(
            "SELECT fingerprint FROM rebalance_snapshots WHERE index_id = ? AND timestamp = ?",
        )
        .bind(snapshot.index_id.as_str())
        .bind(snapshot.timestamp.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let outcome = match existing {
            Some(stored) if stored == fingerprint => {
                tx.rollback().await?;
                return Ok(UpsertOutcome::Unchanged);
            }
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        };

        sqlx::query(
            r#"
            INSERT INTO rebalance_snapshots (
                index_id, timestamp, schema_version, payload,
                nav_at_rebalance, fingerprint, deployed, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            ON CONFLICT(index_id, timestamp) DO UPDATE SET
                schema_version = excluded.schema_version,
                payload = excluded.payload,
                nav_at_rebalance = excluded.nav_at_rebalance,
                fingerprint = excluded.fingerprint,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(snapshot.index_id.as_str())
        .bind(snapshot.timestamp.as_i64())
        .bind(SNAPSHOT_SCHEMA_VERSION)
        .bind(payload)
        .bind(snapshot.nav_at_rebalance.to_canonical_string())
        .bind(fingerprint)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }

    /// Snapshots of an index with `from <= timestamp <= to`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a payload cannot be decoded.
    pub async fn query_snapshots(
        &self,
        index_id: &IndexId,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<Vec<RebalanceSnapshot>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT index_id, timestamp, payload, nav_at_rebalance, deployed
            FROM rebalance_snapshots
            WHERE index_id = ? AND timestamp >= ? AND timestamp <= ?
            ORDER BY timestamp ASC
            "#,
        )
        .bind(index_id.as_str())
        .bind(from.map(|t| t.as_i64()).unwrap_or(i64::MIN))
        .bind(to.map(|t| t.as_i64()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(snapshot_from_row).collect()
    }

    /// The most recent snapshot of an index.
    ///
    /// # Errors
    /// Returns an error if the query fails or the payload cannot be decoded.
    pub async fn get_latest_snapshot(
        &self,
        index_id: &IndexId,
    ) -> Result<Option<RebalanceSnapshot>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT index_id, timestamp, payload, nav_at_rebalance, deployed
            FROM rebalance_snapshots
            WHERE index_id = ?
            ORDER BY timestamp DESC
            LIMIT 1
            "#,
        )
        .bind(index_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(snapshot_from_row).transpose()
    }
}

fn snapshot_from_row(row: &SqliteRow) -> Result<RebalanceSnapshot, sqlx::Error> {
    let payload: String = row.try_get("payload")?;
    let constituents = RebalanceSnapshot::decode_payload(&payload).map_err(|e| {
        sqlx::Error::ColumnDecode {
            index: "payload".to_string(),
            source: Box::new(e),
        }
    })?;
    let deployed: i64 = row.try_get("deployed")?;

    Ok(RebalanceSnapshot {
        index_id: IndexId::new(row.try_get::<String, _>("index_id")?),
        timestamp: Timestamp::new(row.try_get("timestamp")?),
        constituents,
        nav_at_rebalance: decimal_column(row, "nav_at_rebalance")?,
        deployed: deployed != 0,
    })
}
