//! Investable assets and their historical prices.

use super::{normalize_symbol, AssetId, Decimal, Timestamp};
use serde::{Deserialize, Serialize};

/// A token from the market-cap-ranked universe, as seen at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub asset_id: AssetId,
    pub symbol: String,
    pub market_cap: Decimal,
    pub market_cap_rank: Option<u32>,
    pub categories: Vec<String>,
    /// Set when the category tags could not be fetched. Such an asset cannot
    /// be screened against the category blacklist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_error: Option<String>,
}

impl Asset {
    pub fn new(asset_id: AssetId, symbol: impl Into<String>, market_cap: Decimal) -> Self {
        Self {
            asset_id,
            symbol: symbol.into(),
            market_cap,
            market_cap_rank: None,
            categories: Vec::new(),
            category_error: None,
        }
    }

    pub fn with_rank(mut self, rank: u32) -> Self {
        self.market_cap_rank = Some(rank);
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category_error(mut self, error: impl Into<String>) -> Self {
        self.category_error = Some(error.into());
        self
    }

    pub fn normalized_symbol(&self) -> String {
        normalize_symbol(&self.symbol)
    }
}

/// One entry of the Price Store: the price of an asset on a UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: Timestamp,
    pub price: Decimal,
}

impl PricePoint {
    pub fn new(timestamp: Timestamp, price: Decimal) -> Self {
        Self { timestamp, price }
    }
}
