//! Quantity-anchored NAV reconstruction, one rebalance period at a time.
//!
//! Everything here is pure: the orchestrator fetches prices, then folds the
//! last known NAV through [`walk_period`] for each period in order.

use crate::domain::calendar::{self, SECONDS_PER_DAY};
use crate::domain::decimal::NAV_DECIMAL_PLACES;
use crate::domain::{
    AssetId, Constituent, DailyNavPoint, Decimal, IndexId, PricePoint, Quantities,
    RebalanceSnapshot, Timestamp,
};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// NAV of every index at inception.
pub const DEFAULT_BASE_NAV: i64 = 10_000;

/// A sorted, de-duplicated price history for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);
        Self { points }
    }

    /// Nearest-neighbour price to `target`, within `tolerance_days`.
    ///
    /// Binary-searches the first point at or after `target`; the preceding
    /// point is used instead when it is at least as close.
    pub fn nearest(&self, target: Timestamp, tolerance_days: i64) -> Option<Decimal> {
        let idx = self.points.partition_point(|p| p.timestamp < target);
        let after = self.points.get(idx);
        let before = idx.checked_sub(1).and_then(|i| self.points.get(i));

        let best = match (before, after) {
            (_, Some(a)) if a.timestamp == target => a,
            (Some(b), Some(a)) => {
                let back = target.as_i64() - b.timestamp.as_i64();
                let forward = a.timestamp.as_i64() - target.as_i64();
                if back <= forward {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };

        let distance = (best.timestamp.as_i64() - target.as_i64()).abs();
        (distance <= tolerance_days * SECONDS_PER_DAY).then_some(best.price)
    }
}

/// The half-open day range `[start, end)` governed by one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub snapshot_index: usize,
    pub start: Timestamp,
    pub end: Timestamp,
    pub is_final: bool,
}

impl Period {
    pub fn days(&self) -> impl Iterator<Item = Timestamp> {
        calendar::days_in_range(self.start, self.end)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Split time into periods, one per snapshot, for snapshots sorted ascending.
///
/// Starts are aligned up to UTC midnight. The final period ends at `today`'s
/// midnight (exclusive), so it runs through yesterday. Empty periods (two
/// snapshots on the same day, or a snapshot taken today) are dropped.
pub fn plan_periods(snapshots: &[RebalanceSnapshot], today: Timestamp) -> Vec<Period> {
    let today = calendar::floor_to_midnight(today);
    let last = snapshots.len().saturating_sub(1);
    snapshots
        .iter()
        .enumerate()
        .map(|(i, snapshot)| {
            let start = calendar::ceil_to_midnight(snapshot.timestamp);
            let end = snapshots
                .get(i + 1)
                .map(|next| calendar::ceil_to_midnight(next.timestamp))
                .unwrap_or(today);
            Period {
                snapshot_index: i,
                start,
                end,
                is_final: i == last,
            }
        })
        .filter(|p| !p.is_empty())
        .collect()
}

/// Unit quantities per NAV unit: `anchor × weight/totalWeight ÷ rebalance price`.
///
/// Constituents with a non-positive rebalance price are left out.
pub fn compute_quantities(anchor: Decimal, constituents: &[Constituent]) -> Quantities {
    let total_bps: u32 = constituents.iter().map(|c| u32::from(c.weight_bps)).sum();
    let mut quantities = BTreeMap::new();
    for c in constituents {
        if !c.price.is_positive() {
            warn!(asset_id = %c.asset_id, price = %c.price, "Skipping constituent with non-positive rebalance price");
            continue;
        }
        let Some(fraction) = Decimal::bps_fraction(u32::from(c.weight_bps), total_bps) else {
            continue;
        };
        match (anchor * fraction).checked_div(c.price) {
            Some(qty) => {
                quantities.insert(c.asset_id.clone(), qty);
            }
            None => {
                warn!(asset_id = %c.asset_id, "Quantity overflow, skipping constituent");
            }
        }
    }
    quantities
}

/// NAV on `day`: `Σ quantity × nearest price` over assets with a price.
///
/// `None` if no asset has a price within tolerance.
pub fn price_on_day(
    day: Timestamp,
    quantities: &Quantities,
    series: &HashMap<AssetId, PriceSeries>,
    tolerance_days: i64,
) -> Option<Decimal> {
    let mut total = Decimal::zero();
    let mut priced = 0usize;
    for (asset_id, qty) in quantities {
        if let Some(price) = series
            .get(asset_id)
            .and_then(|s| s.nearest(day, tolerance_days))
        {
            total += *qty * price;
            priced += 1;
        }
    }
    (priced > 0).then(|| total.round_dp(NAV_DECIMAL_PLACES))
}

/// Result of walking one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodOutcome {
    /// Newly computed points, in date order.
    pub points: Vec<DailyNavPoint>,
    /// Days with no price data for any asset.
    pub gaps: Vec<Timestamp>,
    /// NAV carried into the next period.
    pub last_known: Decimal,
}

/// Walk the days of `period` in order, compounding from `last_known`.
///
/// Days present in `existing` are not recomputed; their stored NAV is carried
/// forward instead.
pub fn walk_period(
    index_id: &IndexId,
    period: &Period,
    quantities: &Quantities,
    series: &HashMap<AssetId, PriceSeries>,
    existing: &BTreeMap<Timestamp, Decimal>,
    last_known: Decimal,
    tolerance_days: i64,
) -> PeriodOutcome {
    let mut outcome = PeriodOutcome {
        points: Vec::new(),
        gaps: Vec::new(),
        last_known,
    };

    for day in period.days() {
        if let Some(stored) = existing.get(&day) {
            outcome.last_known = *stored;
            continue;
        }
        match price_on_day(day, quantities, series, tolerance_days) {
            Some(price) => {
                outcome.last_known = price;
                outcome.points.push(DailyNavPoint {
                    index_id: index_id.clone(),
                    day,
                    price,
                    quantities: quantities.clone(),
                });
            }
            None => outcome.gaps.push(day),
        }
    }

    outcome
}
