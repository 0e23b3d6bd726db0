//! Domain types for index composition and NAV reconstruction.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: Timestamp, IndexId, AssetId, Exchange, Pair
//! - A single UTC calendar utility for day alignment
//! - Listing Directory records, rebalance snapshots and daily NAV points

pub mod asset;
pub mod calendar;
pub mod decimal;
pub mod listing;
pub mod nav;
pub mod primitives;
pub mod snapshot;

pub use asset::{Asset, PricePoint};
pub use decimal::{Decimal, BPS_SCALE};
pub use listing::{ListingDates, ListingDirectory, ListingRecord};
pub use nav::{DailyNavPoint, Quantities};
pub use primitives::{
    normalize_symbol, AssetId, Exchange, IndexId, Pair, PairParseError, Timestamp,
    QUOTE_CURRENCIES,
};
pub use snapshot::{Constituent, RebalanceSnapshot, SnapshotError, SNAPSHOT_SCHEMA_VERSION};
