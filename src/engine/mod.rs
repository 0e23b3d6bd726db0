//! Pure computation engines for index composition and NAV reconstruction.

use crate::domain::{Pair, SnapshotError};
use thiserror::Error;

pub mod consolidation;
pub mod eligibility;
pub mod nav;
pub mod pair_resolver;
pub mod weighting;

pub use consolidation::ConsolidationPolicy;
pub use eligibility::{Blacklist, Screener, Screening, SkipReason, SkippedAsset};
pub use nav::{PeriodOutcome, PriceSeries, DEFAULT_BASE_NAV};
pub use pair_resolver::PairResolver;
pub use weighting::{assign_weights, distribute_equal_weights, Candidate};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Data-unavailability: nothing passed screening. Nothing is persisted.
    #[error("no eligible constituents")]
    NoEligibleConstituents,
    /// Configuration error: the consolidation target is not in the snapshot.
    #[error("consolidation target pair {0} is not a constituent")]
    ConsolidationTargetMissing(Pair),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl From<SnapshotError> for EngineError {
    fn from(err: SnapshotError) -> Self {
        EngineError::InvalidSnapshot(err.to_string())
    }
}
