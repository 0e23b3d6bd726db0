//! Rebalance: screen the ranked universe, weight it and persist a snapshot.

use crate::config::{Config, IndexDefinition};
use crate::datasource::{DataSourceError, MarketDataSource};
use crate::db::{Repository, UpsertOutcome};
use crate::domain::{calendar, AssetId, Decimal, IndexId, PricePoint, RebalanceSnapshot, Timestamp};
use crate::engine::{
    assign_weights, Candidate, EngineError, Screener, Screening, SkipReason, SkippedAsset,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Result of one successful rebalance.
#[derive(Debug, Clone)]
pub struct RebalanceOutcome {
    pub snapshot: RebalanceSnapshot,
    pub skipped: Vec<SkippedAsset>,
    pub upsert: UpsertOutcome,
}

#[derive(Clone)]
pub struct Rebalancer {
    datasource: Arc<dyn MarketDataSource>,
    repo: Arc<Repository>,
    config: Config,
}

impl Rebalancer {
    pub fn new(datasource: Arc<dyn MarketDataSource>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            datasource,
            repo,
            config,
        }
    }

    /// Compute and persist the snapshot of `index` at `as_of`.
    ///
    /// Walks the market-cap ranking page by page until `target_count`
    /// constituents are collected, the market-cap floor is crossed, or the
    /// ranking runs out. Assets that fail screening or have no price are
    /// reported in [`RebalanceOutcome::skipped`].
    ///
    /// # Errors
    /// [`EngineError::NoEligibleConstituents`] if nothing qualifies, in which
    /// case nothing is written. Ranking and database failures abort the run.
    pub async fn compute_weights(
        &self,
        index: &IndexDefinition,
        as_of: Timestamp,
        target_count: usize,
    ) -> Result<RebalanceOutcome, RebalanceError> {
        let directory = self.repo.load_listing_directory().await?;
        let blacklist = self.config.blacklist();
        let floor = self.config.market_cap_floor(&index.mode);
        let page_size = self.config.page_size.max(1);

        let mut screener = Screener::new(&directory, &blacklist, as_of);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut skipped: Vec<SkippedAsset> = Vec::new();

        'pages: for page in 1..=self.config.max_pages {
            let assets = self
                .datasource
                .list_market_cap_ranked(index.category(), page, page_size)
                .await?;
            let exhausted = (assets.len() as u32) < page_size;

            for asset in assets {
                if asset.market_cap < floor {
                    debug!(
                        index_id = %index.index_id,
                        asset_id = %asset.asset_id,
                        market_cap = %asset.market_cap,
                        "Market cap below floor, stopping scan"
                    );
                    break 'pages;
                }

                let pair = match screener.screen(&asset) {
                    Screening::Eligible(pair) => pair,
                    Screening::Skipped(reason) => {
                        debug!(asset_id = %asset.asset_id, ?reason, "Skipping asset");
                        skipped.push(SkippedAsset::new(&asset, reason));
                        continue;
                    }
                };

                let price = match self.rebalance_price(&asset.asset_id, as_of).await {
                    Ok(Some(price)) if price.is_positive() => price,
                    Ok(_) => {
                        skipped.push(SkippedAsset::new(&asset, SkipReason::MissingPrice));
                        continue;
                    }
                    Err(RebalanceError::DataSource(e)) => {
                        warn!(asset_id = %asset.asset_id, error = %e, "Price fetch failed, skipping asset");
                        skipped.push(SkippedAsset::new(
                            &asset,
                            SkipReason::PriceFeedError(e.to_string()),
                        ));
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                screener.mark_included(&asset);
                candidates.push(Candidate { asset, pair, price });
                if candidates.len() >= target_count {
                    break 'pages;
                }
            }

            if exhausted {
                break;
            }
        }

        if candidates.is_empty() {
            warn!(index_id = %index.index_id, skipped = skipped.len(), "No eligible constituents");
            return Err(EngineError::NoEligibleConstituents.into());
        }

        let snapshot =
            RebalanceSnapshot::new(index.index_id.clone(), as_of, assign_weights(candidates));
        snapshot.validate().map_err(EngineError::from)?;

        let upsert = self.repo.upsert_snapshot(&snapshot).await?;
        info!(
            index_id = %snapshot.index_id,
            timestamp = %snapshot.timestamp,
            constituents = snapshot.constituents.len(),
            skipped = skipped.len(),
            nav = %snapshot.nav_at_rebalance,
            ?upsert,
            "Rebalance snapshot stored"
        );

        Ok(RebalanceOutcome {
            snapshot,
            skipped,
            upsert,
        })
    }

    /// Whether `index_id` has no snapshot yet, or its latest one is at least
    /// `rebalance_interval_days` older than the day of `as_of`.
    pub async fn rebalance_due(
        &self,
        index_id: &IndexId,
        as_of: Timestamp,
    ) -> Result<bool, RebalanceError> {
        let Some(latest) = self.repo.get_latest_snapshot(index_id).await? else {
            return Ok(true);
        };
        let age = calendar::days_between(
            calendar::floor_to_midnight(latest.timestamp),
            calendar::floor_to_midnight(as_of),
        );
        Ok(age >= self.config.rebalance_interval_days)
    }

    /// The most recent snapshot of an index as it would be deployed, with the
    /// consolidation policy applied.
    ///
    /// # Errors
    /// [`EngineError::ConsolidationTargetMissing`] if the policy covers the
    /// index and its target pair is absent.
    pub async fn latest_deployable_snapshot(
        &self,
        index_id: &IndexId,
    ) -> Result<Option<RebalanceSnapshot>, RebalanceError> {
        let Some(latest) = self.repo.get_latest_snapshot(index_id).await? else {
            return Ok(None);
        };
        Ok(Some(self.config.consolidation.view(&latest)?))
    }

    /// Stored price on the day of `as_of`, fetching and persisting it on a miss.
    async fn rebalance_price(
        &self,
        asset_id: &AssetId,
        as_of: Timestamp,
    ) -> Result<Option<Decimal>, RebalanceError> {
        if let Some(price) = self.repo.get_asset_price(asset_id, as_of).await? {
            return Ok(Some(price));
        }

        let Some(price) = self.datasource.price_at(asset_id, as_of).await? else {
            return Ok(None);
        };
        self.repo
            .insert_asset_prices(
                asset_id,
                &[PricePoint::new(calendar::floor_to_midnight(as_of), price)],
            )
            .await?;
        Ok(Some(price))
    }
}

#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
