//! Terminal-rebalance consolidation: fold one exchange's weight into a single pair.

use super::EngineError;
use crate::domain::{Constituent, Exchange, IndexId, Pair, RebalanceSnapshot};
use std::collections::HashSet;

/// Which indices get consolidated, which exchange is folded, and into what.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidationPolicy {
    pub index_ids: HashSet<IndexId>,
    pub source_exchange: Exchange,
    pub target_pair: Pair,
}

impl ConsolidationPolicy {
    pub fn new<I>(index_ids: I, source_exchange: Exchange, target_pair: Pair) -> Self
    where
        I: IntoIterator<Item = IndexId>,
    {
        Self {
            index_ids: index_ids.into_iter().collect(),
            source_exchange,
            target_pair,
        }
    }

    /// Policy for the broad index: `bg.*` folds into `bi.BTCUSDC`.
    pub fn broad_default(index_id: IndexId) -> Self {
        Self::new(
            [index_id],
            Exchange::Bitget,
            Pair::new(Exchange::Binance, "BTC", "USDC"),
        )
    }

    pub fn applies_to(&self, index_id: &IndexId) -> bool {
        self.index_ids.contains(index_id)
    }

    /// Remove every constituent on the source exchange and add its summed weight
    /// to the target pair. Order of the remaining constituents is preserved.
    ///
    /// # Errors
    /// [`EngineError::ConsolidationTargetMissing`] if the target pair is not a constituent.
    pub fn consolidate(&self, constituents: &[Constituent]) -> Result<Vec<Constituent>, EngineError> {
        let folded: u32 = constituents
            .iter()
            .filter(|c| c.pair.exchange == self.source_exchange)
            .map(|c| u32::from(c.weight_bps))
            .sum();

        let mut kept: Vec<Constituent> = constituents
            .iter()
            .filter(|c| c.pair.exchange != self.source_exchange)
            .cloned()
            .collect();

        let target = kept
            .iter_mut()
            .find(|c| c.pair == self.target_pair)
            .ok_or_else(|| EngineError::ConsolidationTargetMissing(self.target_pair.clone()))?;

        let weight = u32::from(target.weight_bps) + folded;
        target.weight_bps = u16::try_from(weight)
            .map_err(|_| EngineError::InvalidSnapshot(format!("weight overflow: {}", weight)))?;
        Ok(kept)
    }

    /// The snapshot as it is deployed: consolidated when the policy covers its
    /// index, unchanged otherwise. The stored snapshot is never modified.
    ///
    /// # Errors
    /// [`EngineError::ConsolidationTargetMissing`] if the target pair is not a constituent.
    pub fn view(&self, snapshot: &RebalanceSnapshot) -> Result<RebalanceSnapshot, EngineError> {
        if !self.applies_to(&snapshot.index_id) {
            return Ok(snapshot.clone());
        }
        let constituents = self.consolidate(&snapshot.constituents)?;
        let mut view =
            RebalanceSnapshot::new(snapshot.index_id.clone(), snapshot.timestamp, constituents);
        view.deployed = snapshot.deployed;
        Ok(view)
    }
}
