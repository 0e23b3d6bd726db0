//! Market-data abstraction for the ranked token universe and historical prices.

use crate::domain::{Asset, AssetId, Decimal, PricePoint, Timestamp};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod coingecko;
pub mod mock;

pub use coingecko::CoinGeckoDataSource;
pub use mock::MockMarketDataSource;

/// Market-data provider consumed by the composition and reconstruction engines.
///
/// Implementations must handle pagination, retry/backoff, and rate limiting.
#[async_trait]
pub trait MarketDataSource: Send + Sync + fmt::Debug {
    /// List assets ordered by market capitalization, largest first.
    ///
    /// # Arguments
    /// * `category` - Restrict the ranking to one category tag (thematic indices)
    /// * `page` - 1-based page number
    /// * `page_size` - Assets per page
    ///
    /// # Returns
    /// One page of assets with their category tags. An empty page means the
    /// ranking is exhausted.
    async fn list_market_cap_ranked(
        &self,
        category: Option<&str>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Asset>, DataSourceError>;

    /// Price of an asset on the UTC day containing `at`, or None if the
    /// provider has no data for that day.
    async fn price_at(
        &self,
        asset_id: &AssetId,
        at: Timestamp,
    ) -> Result<Option<Decimal>, DataSourceError>;

    /// Daily prices of an asset with `from <= timestamp <= to`, ascending.
    async fn price_history(
        &self,
        asset_id: &AssetId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<PricePoint>, DataSourceError>;
}

/// Failure talking to a market-data provider.
///
/// `Network`, `RateLimited` and 5xx `Http` errors are transient and retried
/// by the provider before they surface here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unexpected response: {0}")]
    Parse(String),
    #[error("rate limited")]
    RateLimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datasource_error_display() {
        let err = DataSourceError::Http {
            status: 404,
            message: "coin not found".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 404: coin not found");
        assert_eq!(DataSourceError::RateLimited.to_string(), "rate limited");
        assert_eq!(
            DataSourceError::Parse("missing prices".to_string()).to_string(),
            "unexpected response: missing prices"
        );
    }
}
