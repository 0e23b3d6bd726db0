//! Listing Directory records and exchange whitelists.

use super::{normalize_symbol, Exchange, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Listing and delisting dates of one pair on one exchange.
///
/// Any date may be unknown. Effective dates take precedence over announcements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDates {
    pub listing_announced_at: Option<Timestamp>,
    pub listing_effective_at: Option<Timestamp>,
    pub delisting_announced_at: Option<Timestamp>,
    pub delisting_effective_at: Option<Timestamp>,
}

impl ListingDates {
    pub fn listed_at(effective: Timestamp) -> Self {
        Self {
            listing_effective_at: Some(effective),
            ..Default::default()
        }
    }

    /// The date the pair went live: effective if known, else the announcement.
    pub fn listing_date(&self) -> Option<Timestamp> {
        self.listing_effective_at.or(self.listing_announced_at)
    }

    /// Listed as of `t` iff a listing date `<= t` exists and no delisting date
    /// (effective or announced) `<= t` exists.
    pub fn is_listed_as_of(&self, t: Timestamp) -> bool {
        let listed = self.listing_date().is_some_and(|d| d <= t);
        let delisted = [self.delisting_effective_at, self.delisting_announced_at]
            .into_iter()
            .flatten()
            .any(|d| d <= t);
        listed && !delisted
    }
}

/// One Listing Directory row, keyed by unqualified ticker (e.g. `FOOUSDC`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub ticker: String,
    pub base_symbol: String,
    pub exchanges: BTreeMap<Exchange, ListingDates>,
}

impl ListingRecord {
    pub fn new(ticker: &str, base_symbol: &str) -> Self {
        Self {
            ticker: normalize_symbol(ticker),
            base_symbol: normalize_symbol(base_symbol),
            exchanges: BTreeMap::new(),
        }
    }

    pub fn with_exchange(mut self, exchange: Exchange, dates: ListingDates) -> Self {
        self.exchanges.insert(exchange, dates);
        self
    }

    pub fn is_listed_as_of(&self, exchange: Exchange, t: Timestamp) -> bool {
        self.exchanges
            .get(&exchange)
            .is_some_and(|dates| dates.is_listed_as_of(t))
    }
}

/// Read-only view of the Listing Directory plus per-exchange whitelists,
/// loaded once per rebalance.
#[derive(Debug, Clone, Default)]
pub struct ListingDirectory {
    records: HashMap<String, ListingRecord>,
    whitelists: HashMap<Exchange, HashSet<String>>,
}

impl ListingDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ListingRecord) {
        self.records.insert(record.ticker.clone(), record);
    }

    pub fn with_record(mut self, record: ListingRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn whitelist<I, S>(&mut self, exchange: Exchange, tickers: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelists
            .entry(exchange)
            .or_default()
            .extend(tickers.into_iter().map(|t| normalize_symbol(t.as_ref())));
    }

    pub fn with_whitelist<I, S>(mut self, exchange: Exchange, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.whitelist(exchange, tickers);
        self
    }

    pub fn get(&self, ticker: &str) -> Option<&ListingRecord> {
        self.records.get(&normalize_symbol(ticker))
    }

    pub fn is_whitelisted(&self, exchange: Exchange, ticker: &str) -> bool {
        self.whitelists
            .get(&exchange)
            .is_some_and(|set| set.contains(&normalize_symbol(ticker)))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
