//! Rebalance snapshots: the weighted constituent set of an index at one instant.

use super::decimal::BPS_SCALE;
use super::{AssetId, Decimal, Exchange, IndexId, Pair, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Version tag written into every persisted snapshot payload.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// One member of an index at a rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constituent {
    pub asset_id: AssetId,
    pub symbol: String,
    pub pair: Pair,
    pub weight_bps: u16,
    /// Historical price of the asset at the rebalance timestamp.
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("snapshot has no constituents")]
    Empty,
    #[error("weights sum to {0} bps, expected 10000")]
    WeightSum(u32),
    #[error("asset {0} appears more than once")]
    DuplicateAsset(AssetId),
    #[error("unsupported snapshot schema version {0}")]
    UnsupportedVersion(u32),
    #[error("malformed snapshot payload: {0}")]
    Malformed(String),
}

/// Composition of an index at one rebalance timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceSnapshot {
    pub index_id: IndexId,
    pub timestamp: Timestamp,
    /// Constituents in inclusion (market-cap) order.
    pub constituents: Vec<Constituent>,
    /// `Σ weight/10000 × price` at the rebalance.
    pub nav_at_rebalance: Decimal,
    /// Set by the on-chain publisher; never written by the engines.
    pub deployed: bool,
}

/// Persisted form of the constituent list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotPayload {
    version: u32,
    constituents: Vec<Constituent>,
}

impl RebalanceSnapshot {
    pub fn new(index_id: IndexId, timestamp: Timestamp, constituents: Vec<Constituent>) -> Self {
        let nav_at_rebalance = nav_of(&constituents);
        Self {
            index_id,
            timestamp,
            constituents,
            nav_at_rebalance,
            deployed: false,
        }
    }

    /// Weights keyed by resolved pair, in inclusion order.
    pub fn weights(&self) -> Vec<(Pair, u16)> {
        self.constituents
            .iter()
            .map(|c| (c.pair.clone(), c.weight_bps))
            .collect()
    }

    /// The same weights keyed by underlying asset.
    pub fn coins(&self) -> BTreeMap<AssetId, u16> {
        self.constituents
            .iter()
            .map(|c| (c.asset_id.clone(), c.weight_bps))
            .collect()
    }

    /// Rebalance prices keyed by resolved pair.
    pub fn prices(&self) -> BTreeMap<Pair, Decimal> {
        self.constituents
            .iter()
            .map(|c| (c.pair.clone(), c.price))
            .collect()
    }

    pub fn total_weight_bps(&self) -> u32 {
        self.constituents.iter().map(|c| u32::from(c.weight_bps)).sum()
    }

    pub fn has_exchange(&self, exchange: Exchange) -> bool {
        self.constituents.iter().any(|c| c.pair.exchange == exchange)
    }

    /// Check the structural invariants: non-empty, unique assets, weights sum to 10000.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.constituents.is_empty() {
            return Err(SnapshotError::Empty);
        }
        let mut seen = HashSet::new();
        for c in &self.constituents {
            if !seen.insert(&c.asset_id) {
                return Err(SnapshotError::DuplicateAsset(c.asset_id.clone()));
            }
        }
        let total = self.total_weight_bps();
        if total != BPS_SCALE {
            return Err(SnapshotError::WeightSum(total));
        }
        Ok(())
    }

    /// Encode the constituent list for persistence.
    pub fn encode_payload(&self) -> Result<String, SnapshotError> {
        serde_json::to_string(&SnapshotPayload {
            version: SNAPSHOT_SCHEMA_VERSION,
            constituents: self.constituents.clone(),
        })
        .map_err(|e| SnapshotError::Malformed(e.to_string()))
    }

    /// Decode a persisted constituent list, rejecting unknown schema versions.
    pub fn decode_payload(payload: &str) -> Result<Vec<Constituent>, SnapshotError> {
        let parsed: SnapshotPayload =
            serde_json::from_str(payload).map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        if parsed.version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion(parsed.version));
        }
        Ok(parsed.constituents)
    }

    /// Content hash over everything the engines write (not `deployed`).
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.index_id.as_str());
        hasher.update(self.timestamp.as_i64().to_le_bytes());
        for c in &self.constituents {
            hasher.update(c.asset_id.as_str());
            hasher.update(c.pair.to_string());
            hasher.update(c.weight_bps.to_le_bytes());
            hasher.update(c.price.to_canonical_string());
        }
        let hash = hasher.finalize();
        hex::encode(&hash[..16])
    }
}

/// NAV implied by a constituent list: `Σ weight_i/10000 × price_i`.
pub fn nav_of(constituents: &[Constituent]) -> Decimal {
    constituents
        .iter()
        .filter_map(|c| {
            Decimal::bps_fraction(u32::from(c.weight_bps), BPS_SCALE).map(|w| w * c.price)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn constituent(asset: &str, pair: &str, bps: u16, price: &str) -> Constituent {
        Constituent {
            asset_id: AssetId::new(asset),
            symbol: asset.to_uppercase(),
            pair: Pair::from_str(pair).unwrap(),
            weight_bps: bps,
            price: Decimal::from_str(price).unwrap(),
        }
    }

    fn snapshot(constituents: Vec<Constituent>) -> RebalanceSnapshot {
        RebalanceSnapshot::new(IndexId::new("top100"), Timestamp::new(0), constituents)
    }

    #[test]
    fn test_views_share_constituents() {
        let snap = snapshot(vec![
            constituent("bitcoin", "bi.BTCUSDC", 6000, "50000"),
            constituent("foo", "bg.FOOUSDT", 4000, "2"),
        ]);
        assert_eq!(snap.weights().len(), 2);
        assert_eq!(snap.coins()[&AssetId::new("foo")], 4000);
        assert_eq!(
            snap.prices()[&Pair::from_str("bi.BTCUSDC").unwrap()],
            Decimal::from(50000i64)
        );
        assert!(snap.has_exchange(Exchange::Bitget));
    }

    #[test]
    fn test_nav_at_rebalance() {
        let snap = snapshot(vec![
            constituent("a", "bi.AUSDC", 5000, "10"),
            constituent("b", "bi.BUSDC", 5000, "30"),
        ]);
        assert_eq!(snap.nav_at_rebalance, Decimal::from(20i64));
    }

    #[test]
    fn test_validate() {
        assert_eq!(snapshot(vec![]).validate(), Err(SnapshotError::Empty));
        assert_eq!(
            snapshot(vec![constituent("a", "bi.AUSDC", 9999, "1")]).validate(),
            Err(SnapshotError::WeightSum(9999))
        );
        assert!(matches!(
            snapshot(vec![
                constituent("a", "bi.AUSDC", 5000, "1"),
                constituent("a", "bg.AUSDT", 5000, "1"),
            ])
            .validate(),
            Err(SnapshotError::DuplicateAsset(_))
        ));
        assert!(snapshot(vec![constituent("a", "bi.AUSDC", 10000, "1")])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_payload_rejects_unknown_version() {
        let payload = r#"{"version":99,"constituents":[]}"#;
        assert_eq!(
            RebalanceSnapshot::decode_payload(payload),
            Err(SnapshotError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_payload_decode_matches_encode() {
        let snap = snapshot(vec![constituent("a", "bi.AUSDC", 10000, "1.25")]);
        let payload = snap.encode_payload().unwrap();
        assert!(payload.contains("\"weightBps\":10000"));
        assert_eq!(
            RebalanceSnapshot::decode_payload(&payload).unwrap(),
            snap.constituents
        );
    }

    #[test]
    fn test_fingerprint_ignores_deployed_flag() {
        let mut snap = snapshot(vec![constituent("a", "bi.AUSDC", 10000, "1")]);
        let before = snap.fingerprint();
        snap.deployed = true;
        assert_eq!(before, snap.fingerprint());
        snap.constituents[0].price = Decimal::from(2i64);
        assert_ne!(before, snap.fingerprint());
    }
}
