//! Daily NAV reconstruction over the stored snapshot history of an index.

use crate::config::Config;
use crate::datasource::MarketDataSource;
use crate::db::Repository;
use crate::domain::{calendar, AssetId, DailyNavPoint, Decimal, IndexId, Timestamp};
use crate::engine::nav::{compute_quantities, plan_periods, walk_period, Period};
use crate::engine::{EngineError, PriceSeries};
use futures::future::try_join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// What one reconstruction run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconstructionReport {
    pub index_id: IndexId,
    /// Points computed and written by this run, oldest first. Days that were
    /// already stored are not repeated here.
    pub points: Vec<DailyNavPoint>,
    /// Days inside a period for which no asset had a price.
    pub gaps: Vec<Timestamp>,
    /// NAV at the end of the series.
    pub last_known: Decimal,
}

#[derive(Clone)]
pub struct NavReconstructor {
    datasource: Arc<dyn MarketDataSource>,
    repo: Arc<Repository>,
    config: Config,
}

impl NavReconstructor {
    pub fn new(datasource: Arc<dyn MarketDataSource>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            datasource,
            repo,
            config,
        }
    }

    /// Extend the daily series of `index_id` through yesterday.
    pub async fn reconstruct(
        &self,
        index_id: &IndexId,
    ) -> Result<ReconstructionReport, ReconstructionError> {
        self.reconstruct_until(index_id, Timestamp::now()).await
    }

    /// Extend the daily series of `index_id` through the day before `now`.
    ///
    /// Idempotent and resumable: stored days are never recomputed, and every
    /// new point is persisted as soon as its period is walked.
    ///
    /// # Errors
    /// [`EngineError::ConsolidationTargetMissing`] aborts before anything is
    /// written. Database errors abort, leaving earlier days stored.
    pub async fn reconstruct_until(
        &self,
        index_id: &IndexId,
        now: Timestamp,
    ) -> Result<ReconstructionReport, ReconstructionError> {
        let snapshots = self.repo.query_snapshots(index_id, None, None).await?;
        let mut report = ReconstructionReport {
            index_id: index_id.clone(),
            points: Vec::new(),
            gaps: Vec::new(),
            last_known: self.config.base_nav,
        };
        if snapshots.is_empty() {
            info!(index_id = %index_id, "No snapshots, nothing to reconstruct");
            return Ok(report);
        }

        let existing = self.repo.query_daily_price_map(index_id).await?;
        let periods = plan_periods(&snapshots, now);
        let policy = &self.config.consolidation;
        let tolerance = self.config.price_tolerance_days;

        // Resolved before any write so a missing target aborts the whole run.
        let consolidated = match periods.last() {
            Some(last) if last.is_final && policy.applies_to(index_id) => {
                Some(policy.consolidate(&snapshots[last.snapshot_index].constituents)?)
            }
            _ => None,
        };

        for period in &periods {
            let snapshot = &snapshots[period.snapshot_index];
            let constituents = match &consolidated {
                Some(c) if period.is_final => c.clone(),
                _ => snapshot.constituents.clone(),
            };

            if let Some(stored) = fully_stored(period, &existing) {
                report.last_known = stored;
                continue;
            }

            let quantities = compute_quantities(report.last_known, &constituents);
            let series = self.load_series(quantities.keys(), period).await?;
            let outcome = walk_period(
                index_id,
                period,
                &quantities,
                &series,
                &existing,
                report.last_known,
                tolerance,
            );

            for point in &outcome.points {
                self.repo.upsert_daily_price(point).await?;
            }
            if !outcome.gaps.is_empty() {
                warn!(
                    index_id = %index_id,
                    snapshot = %snapshot.timestamp,
                    gaps = outcome.gaps.len(),
                    "Days without any price data were skipped"
                );
            }
            debug!(
                index_id = %index_id,
                start = %period.start,
                end = %period.end,
                written = outcome.points.len(),
                "Period reconstructed"
            );

            report.last_known = outcome.last_known;
            report.points.extend(outcome.points);
            report.gaps.extend(outcome.gaps);
        }

        info!(
            index_id = %index_id,
            periods = periods.len(),
            written = report.points.len(),
            gaps = report.gaps.len(),
            nav = %report.last_known,
            "NAV reconstruction finished"
        );
        Ok(report)
    }

    /// Price series for every asset over the period, padded by the lookup
    /// tolerance on both sides. One range query per asset.
    async fn load_series<'a>(
        &self,
        asset_ids: impl Iterator<Item = &'a AssetId>,
        period: &Period,
    ) -> Result<HashMap<AssetId, PriceSeries>, ReconstructionError> {
        let tolerance = self.config.price_tolerance_days;
        let from = calendar::add_days(period.start, -tolerance);
        let to = calendar::add_days(period.end, tolerance - 1);
        let last_day = calendar::add_days(period.end, -1);

        let loaded = try_join_all(asset_ids.map(|asset_id| {
            self.load_asset_series(asset_id, from, to, period.start, last_day)
        }))
        .await?;
        Ok(loaded.into_iter().collect())
    }

    async fn load_asset_series(
        &self,
        asset_id: &AssetId,
        from: Timestamp,
        to: Timestamp,
        first_day: Timestamp,
        last_day: Timestamp,
    ) -> Result<(AssetId, PriceSeries), ReconstructionError> {
        let mut points = self.repo.query_asset_prices(asset_id, from, to).await?;

        let covered = matches!(
            (points.first(), points.last()),
            (Some(first), Some(last)) if first.timestamp <= first_day && last.timestamp >= last_day
        );
        if !covered {
            match self.datasource.price_history(asset_id, from, to).await {
                Ok(fetched) => {
                    let added = self.repo.insert_asset_prices(asset_id, &fetched).await?;
                    debug!(asset_id = %asset_id, fetched = fetched.len(), added, "Backfilled prices");
                    points.extend(fetched.into_iter().map(|mut p| {
                        p.timestamp = calendar::floor_to_midnight(p.timestamp);
                        p
                    }));
                }
                Err(e) => {
                    warn!(asset_id = %asset_id, error = %e, "Price backfill failed, using stored prices only");
                }
            }
        }

        Ok((asset_id.clone(), PriceSeries::new(points)))
    }
}

/// NAV of the last day when every day of the period is already stored.
fn fully_stored(period: &Period, existing: &BTreeMap<Timestamp, Decimal>) -> Option<Decimal> {
    let mut last = None;
    for day in period.days() {
        last = Some(*existing.get(&day)?);
    }
    last
}

#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
