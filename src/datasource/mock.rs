//! Mock market data for testing without network calls.

use super::{DataSourceError, MarketDataSource};
use crate::domain::{calendar, Asset, AssetId, Decimal, PricePoint, Timestamp};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock market-data source that serves predefined assets and daily prices.
#[derive(Debug, Default)]
pub struct MockMarketDataSource {
    assets: Vec<Asset>,
    prices: HashMap<AssetId, BTreeMap<Timestamp, Decimal>>,
    failing: HashSet<AssetId>,
    failing_categories: HashSet<AssetId>,
    price_at_calls: AtomicUsize,
    price_history_calls: AtomicUsize,
}

impl MockMarketDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset to the ranked universe. Ranking is by market cap, largest
    /// first, with insertion order breaking ties.
    pub fn with_asset(mut self, asset: Asset) -> Self {
        self.assets.push(asset);
        self
    }

    /// Set the daily price of an asset for each `(timestamp, price)` pair.
    /// Timestamps are floored to UTC midnight.
    pub fn with_prices(
        mut self,
        asset_id: &AssetId,
        prices: impl IntoIterator<Item = (Timestamp, Decimal)>,
    ) -> Self {
        let series = self.prices.entry(asset_id.clone()).or_default();
        for (ts, price) in prices {
            series.insert(calendar::floor_to_midnight(ts), price);
        }
        self
    }

    /// Make every price request for this asset fail with a network error.
    pub fn with_failing_asset(mut self, asset_id: &AssetId) -> Self {
        self.failing.insert(asset_id.clone());
        self
    }

    /// Serve this asset in the ranking without its category tags, as when the
    /// per-coin category lookup fails.
    pub fn with_failing_categories(mut self, asset_id: &AssetId) -> Self {
        self.failing_categories.insert(asset_id.clone());
        self
    }

    pub fn price_at_calls(&self) -> usize {
        self.price_at_calls.load(Ordering::SeqCst)
    }

    pub fn price_history_calls(&self) -> usize {
        self.price_history_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self, asset_id: &AssetId) -> Result<(), DataSourceError> {
        if self.failing.contains(asset_id) {
            return Err(DataSourceError::Network(format!(
                "injected failure for {}",
                asset_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataSource for MockMarketDataSource {
    async fn list_market_cap_ranked(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Asset>, DataSourceError> {
        let mut ranked: Vec<&Asset> = self
            .assets
            .iter()
            .filter(|a| category.map_or(true, |c| a.categories.iter().any(|t| t == c)))
            .collect();
        ranked.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));

        let skip = (page.saturating_sub(1) as usize) * page_size as usize;
        Ok(ranked
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .map(|asset| {
                if self.failing_categories.contains(&asset.asset_id) {
                    Asset {
                        categories: Vec::new(),
                        ..asset.clone()
                    }
                    .with_category_error(format!("injected category failure for {}", asset.asset_id))
                } else {
                    asset.clone()
                }
            })
            .collect())
    }

    async fn price_at(
        &self,
        asset_id: &AssetId,
        at: Timestamp,
    ) -> Result<Option<Decimal>, DataSourceError> {
        self.price_at_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(asset_id)?;

        Ok(self
            .prices
            .get(asset_id)
            .and_then(|series| series.get(&calendar::floor_to_midnight(at)))
            .copied())
    }

    async fn price_history(
        &self,
        asset_id: &AssetId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<PricePoint>, DataSourceError> {
        self.price_history_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failing(asset_id)?;

        if from > to {
            return Ok(Vec::new());
        }
        Ok(self
            .prices
            .get(asset_id)
            .map(|series| {
                series
                    .range(from..=to)
                    .map(|(ts, price)| PricePoint::new(*ts, *price))
                    .collect()
            })
            .unwrap_or_default())
    }
}
