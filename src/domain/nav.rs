//! Daily NAV points.

use super::{calendar, AssetId, Decimal, IndexId, Timestamp};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unit quantity held per NAV unit, per asset, for one rebalance period.
pub type Quantities = BTreeMap<AssetId, Decimal>;

/// The index's unit NAV on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyNavPoint {
    pub index_id: IndexId,
    /// UTC midnight of the day.
    pub day: Timestamp,
    pub price: Decimal,
    pub quantities: Quantities,
}

impl DailyNavPoint {
    pub fn date(&self) -> NaiveDate {
        calendar::to_date(self.day)
    }
}
