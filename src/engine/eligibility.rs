//! Per-candidate screening for the Eligibility & Weighting Engine.

use super::pair_resolver::PairResolver;
use crate::domain::{normalize_symbol, Asset, AssetId, ListingDirectory, Pair, Timestamp};
use serde::Serialize;
use std::collections::HashSet;

pub const DEFAULT_CATEGORY_BLACKLIST: &[&str] = &[
    "Stablecoins",
    "USD Stablecoin",
    "Wrapped-Tokens",
    "Bridged-Tokens",
    "Bridged Stablecoins",
    "Crypto-Backed Tokens",
];

pub const DEFAULT_TOKEN_BLACKLIST: &[&str] =
    &["USDT", "USDC", "DAI", "FDUSD", "TUSD", "WBTC", "WETH", "STETH"];

/// Category and token exclusions. Categories compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blacklist {
    categories: HashSet<String>,
    tokens: HashSet<String>,
}

impl Blacklist {
    pub fn new<C, T>(categories: C, tokens: T) -> Self
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .collect(),
            tokens: tokens
                .into_iter()
                .map(|t| normalize_symbol(t.as_ref()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<String>::new(), Vec::<String>::new())
    }

    pub fn check(&self, asset: &Asset) -> Option<SkipReason> {
        if self.tokens.contains(&asset.normalized_symbol()) {
            return Some(SkipReason::BlacklistedToken);
        }
        asset
            .categories
            .iter()
            .find(|c| self.categories.contains(&c.trim().to_lowercase()))
            .map(|c| SkipReason::BlacklistedCategory(c.clone()))
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORY_BLACKLIST, DEFAULT_TOKEN_BLACKLIST)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    DuplicateSymbol,
    NoTradablePair,
    BlacklistedCategory(String),
    BlacklistedToken,
    MissingPrice,
    PriceFeedError(String),
    CategoryFeedError(String),
}

/// An asset passed over during a rebalance, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAsset {
    pub asset_id: AssetId,
    pub symbol: String,
    pub reason: SkipReason,
}

impl SkippedAsset {
    pub fn new(asset: &Asset, reason: SkipReason) -> Self {
        Self {
            asset_id: asset.asset_id.clone(),
            symbol: asset.symbol.clone(),
            reason,
        }
    }
}

/// Outcome of screening one candidate before its price is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screening {
    Eligible(Pair),
    Skipped(SkipReason),
}

/// Stateful screen over a market-cap-ordered candidate stream.
///
/// Symbols are only remembered once [`Screener::mark_included`] is called, so
/// a candidate that later fails its price lookup does not shadow a duplicate.
pub struct Screener<'a> {
    resolver: PairResolver<'a>,
    blacklist: &'a Blacklist,
    as_of: Timestamp,
    included_symbols: HashSet<String>,
}

impl<'a> Screener<'a> {
    pub fn new(directory: &'a ListingDirectory, blacklist: &'a Blacklist, as_of: Timestamp) -> Self {
        Self {
            resolver: PairResolver::new(directory),
            blacklist,
            as_of,
            included_symbols: HashSet::new(),
        }
    }

    pub fn screen(&self, asset: &Asset) -> Screening {
        if self.included_symbols.contains(&asset.normalized_symbol()) {
            return Screening::Skipped(SkipReason::DuplicateSymbol);
        }
        let Some(pair) = self.resolver.resolve(&asset.symbol, self.as_of) else {
            return Screening::Skipped(SkipReason::NoTradablePair);
        };
        if let Some(reason) = self.blacklist.check(asset) {
            return Screening::Skipped(reason);
        }
        if let Some(error) = &asset.category_error {
            return Screening::Skipped(SkipReason::CategoryFeedError(error.clone()));
        }
        Screening::Eligible(pair)
    }

    pub fn mark_included(&mut self, asset: &Asset) {
        self.included_symbols.insert(asset.normalized_symbol());
    }

    pub fn included_count(&self) -> usize {
        self.included_symbols.len()
    }
}
