use crate::domain::{Asset, Constituent, Decimal, Pair, BPS_SCALE};

/// Equal weights in basis points for `n` constituents, summing to exactly 10000.
///
/// Each gets `floor(10000 / n)`; the first `10000 mod n` get one extra bps.
pub fn distribute_equal_weights(n: usize) -> Vec<u16> {
    if n == 0 {
        return Vec::new();
    }
    let total = BPS_SCALE as usize;
    let base = total / n;
    let remainder = total % n;
    (0..n)
        .map(|i| (base + usize::from(i < remainder)) as u16)
        .collect()
}

/// An asset that passed screening and has a rebalance price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub asset: Asset,
    pub pair: Pair,
    pub price: Decimal,
}

/// Turn candidates (in inclusion order) into equally weighted constituents.
pub fn assign_weights(candidates: Vec<Candidate>) -> Vec<Constituent> {
    let weights = distribute_equal_weights(candidates.len());
    candidates
        .into_iter()
        .zip(weights)
        .map(|(c, weight_bps)| Constituent {
            asset_id: c.asset.asset_id,
            symbol: c.asset.symbol,
            pair: c.pair,
            weight_bps,
            price: c.price,
        })
        .collect()
}
